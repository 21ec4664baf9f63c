use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("statement cache requires a maximum size greater than zero")]
    MaxSizeZero,
}
