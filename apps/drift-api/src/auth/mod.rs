pub mod tokens;

pub use tokens::{issue_token, verify_token, TokenData};
