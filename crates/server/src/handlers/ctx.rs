use crate::config::AppState;
use crate::error::{Error, Result};
use crate::models::Account;
use crate::store::AccountLookup;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

/// Header carrying the authenticated account id, set by the edge that
/// verified the caller's credentials.
pub const ACCOUNT_HEADER: &str = "x-account-id";

/// The acting account of a request
#[derive(Clone, Debug)]
pub struct Ctx {
    account: Account,
}

impl Ctx {
    pub fn new(account: Account) -> Self {
        Self { account }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or(Error::Unauthenticated)
    }
}

/// Resolve the acting account or reject the request with 401.
pub async fn mw_require_account(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let raw = req
        .headers()
        .get(ACCOUNT_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(Error::Unauthenticated)?;
    let id = Uuid::parse_str(raw.trim()).map_err(|_| Error::Unauthenticated)?;

    let account = state
        .accounts
        .by_id(id)
        .await?
        .ok_or(Error::Unauthenticated)?;
    debug!("MIDDLEWARE: acting account {}", account.username);

    req.extensions_mut().insert(Ctx::new(account));
    Ok(next.run(req).await)
}
