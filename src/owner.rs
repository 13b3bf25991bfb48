//! Caller identity guard.
//!
//! Access control happens upstream; by the time a request reaches this server
//! the caller has been resolved to an owner id, forwarded in the `X-Owner-Id`
//! header. Every query in the engine is scoped by this identity.

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub i64);

#[derive(Debug)]
pub enum OwnerError {
    Missing,
    Invalid,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Owner {
    type Error = OwnerError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.headers().get_one("X-Owner-Id") {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(id) if id > 0 => Outcome::Success(Owner(id)),
                _ => Outcome::Error((Status::Unauthorized, OwnerError::Invalid)),
            },
            None => Outcome::Error((Status::Unauthorized, OwnerError::Missing)),
        }
    }
}
