mod credentials;
mod oauth;
mod token;

pub use credentials::{
    hash_password, Credentials, ForgotRequest, OrganizerSignupRequest, ResetRequest,
    SignupRequest, MIN_PASSWORD_LENGTH,
};
pub use oauth::{OAuthRequest, Provider, ProviderIdentity};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};

#[cfg(test)]
pub use oauth::TEST_ACCESS_TOKEN;
