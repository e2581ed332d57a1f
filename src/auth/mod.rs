mod token;

pub use token::{AuthToken, StaticTokenProvider, TokenProvider};
