mod password;
mod token;

pub use password::{hash_password, verify_password, PasswordError};
pub use token::{create_access_token, create_refresh_token, verify_refresh_token, verify_token, ACCESS_TOKEN_HOURS};
