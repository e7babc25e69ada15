//! WorshipTools endpoints and login-flow defaults
//!
//! The browser-flow values describe the public website login; they can be
//! overridden through `BrowserEndpoints` when the site changes its paths.

/// Versioned REST API root
pub const API_BASE_URL: &str = "https://api.worship.tools/v1";

/// Direct password-grant endpoint, relative to `API_BASE_URL`
pub const TOKEN_PATH: &str = "auth/token";

/// Public website (hosts the login initiation and the OAuth callback)
pub const SITE_URL: &str = "https://www.worshiptools.com";

/// Authorization server (hosts the login form)
pub const AUTH_URL: &str = "https://auth.worshiptools.com";

/// Website path that starts the OAuth login by redirecting to `AUTH_URL`
pub const LOGIN_PATH: &str = "/auth/login";

/// Authorization server path the login form posts to
pub const LOGIN_SUBMIT_PATH: &str = "/login";

/// Cookie the website sets with the bearer token after the callback
pub const TOKEN_COOKIE: &str = "access_token";

/// Companion cookie carrying the refresh token
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Follow-up GETs allowed while chasing the post-login redirect chain
pub const MAX_CODE_HOPS: usize = 10;
