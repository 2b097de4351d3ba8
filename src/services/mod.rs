//! Migration pipeline: catalog → resolver → existence probe → transfer,
//! orchestrated by the driver.

pub mod catalog_service;
pub mod checksum;
pub mod dir_store;
pub mod existence_oracle;
pub mod local_resolver;
pub mod migration_driver;
pub mod object_store;
pub mod preflight;
pub mod s3_store;
pub mod transfer_worker;

#[cfg(test)]
pub mod test_support;
