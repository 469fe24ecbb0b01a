pub mod claims;
pub mod issuer;
pub mod token;
pub mod verifier;

pub use claims::{SessionClaims, TOKEN_TTL_SECS};
pub use issuer::TokenIssuer;
pub use token::{Token, TokenMode, TokenState};
pub use verifier::TokenVerifier;
