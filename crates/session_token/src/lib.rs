mod jwt;

pub use jwt::{
    Error, SessionTokenClaims, SessionTokenHeader, TOKEN_VERSION, sign_hs256, verify_hs256,
};
