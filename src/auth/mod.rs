/// Authentication module
///
/// Token signing and verification, password hashing, the token ledger,
/// and the service that ties them together for login and refresh.

mod claims;
mod jwt;
pub mod ledger;
mod password;
mod service;

pub use claims::{Claims, TokenKind};
pub use jwt::TokenCodec;
pub use ledger::{hash_token, TokenEntry, TokenLedger};
pub use password::{PasswordHasher, MAX_BCRYPT_COST, MIN_BCRYPT_COST};
pub use service::{
    bearer_token, AuthService, LoginOutcome, Principal, RefreshOutcome, Registration,
    REGISTERED_MESSAGE,
};
