//! The request methods kvgate routes on.
//!
//! hyper accepts any token as a method. Only the standard ones convert;
//! the server answers everything else with an empty `405`.

use std::fmt;

/// A method the router can register handlers for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
}

const ALL: [(Method, http::Method); 7] = [
    (Method::Delete, http::Method::DELETE),
    (Method::Get, http::Method::GET),
    (Method::Head, http::Method::HEAD),
    (Method::Options, http::Method::OPTIONS),
    (Method::Patch, http::Method::PATCH),
    (Method::Post, http::Method::POST),
    (Method::Put, http::Method::PUT),
];

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

/// Fails for extension methods (`PURGE`, `BREW`, …) and for `CONNECT` and
/// `TRACE`, which nothing here serves.
impl TryFrom<&http::Method> for Method {
    type Error = ();

    fn try_from(m: &http::Method) -> Result<Self, ()> {
        ALL.iter()
            .find(|(_, wire)| wire == m)
            .map(|(method, _)| *method)
            .ok_or(())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
