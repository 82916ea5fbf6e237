mod helpers;
mod middleware;
mod token;

pub use helpers::{TokenSubject, TokenValidationError, issue_token, validate_token};
pub use middleware::{AuthError, Authenticated};
pub use token::{GeneratedToken, ParsedToken, TokenGenerator, TokenKind, parse_token};
