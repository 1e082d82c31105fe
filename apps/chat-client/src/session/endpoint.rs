//! Connection parameters and the session endpoint addressing scheme.
//!
//! `<scheme>://<host>:<port>/<app-path>/chatrooms/<room>?userid=<user>[&rejoin&lasteventid=<id>]`

use chat_common::EventId;
use url::Url;

use crate::error::SessionError;

pub const USER_ID_PARAM: &str = "userid";
pub const REJOIN_PARAM: &str = "rejoin";
pub const LAST_EVENT_ID_PARAM: &str = "lasteventid";

const ROOMS_SEGMENT: &str = "chatrooms";

/// Schemes the transport can actually open. TLS is not built in.
pub const SUPPORTED_SCHEMES: &[&str] = &["ws"];

/// Everything needed to reach one chat room as one user.
///
/// Captured on every `connect()` and reused verbatim by automatic reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub user_id: String,
    pub room: String,
    pub host: String,
    pub port: u16,
}

impl ConnectParams {
    pub fn new(
        user_id: impl Into<String>,
        room: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            room: room.into(),
            host: host.into(),
            port,
        }
    }

    /// Reject values that cannot be placed in the endpoint as-is.
    ///
    /// Callers are expected to sanitize input beforehand; nothing is
    /// rewritten here.
    pub fn validate(&self) -> Result<(), SessionError> {
        validate_segment("user_id", &self.user_id)?;
        validate_segment("room", &self.room)?;
        if self.host.trim().is_empty() {
            return Err(SessionError::invalid("host", "must not be empty"));
        }
        Ok(())
    }
}

fn validate_segment(field: &'static str, value: &str) -> Result<(), SessionError> {
    if value.is_empty() {
        return Err(SessionError::invalid(field, "must not be empty"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(SessionError::invalid(field, "must not contain whitespace"));
    }
    if value.contains(['/', '\\']) {
        return Err(SessionError::invalid(field, "must not contain path separators"));
    }
    Ok(())
}

/// Build the URL for a session connection.
///
/// `resume` is the last accepted event id; when present the server is asked
/// to rejoin and replay everything after it.
pub fn session_url(
    scheme: &str,
    app_path: &str,
    params: &ConnectParams,
    resume: Option<&EventId>,
) -> Result<Url, SessionError> {
    params.validate()?;
    if !SUPPORTED_SCHEMES.contains(&scheme) {
        return Err(SessionError::invalid("scheme", "only ws is supported"));
    }

    let host = if params.host.contains(':') && !params.host.starts_with('[') {
        format!("[{}]", params.host)
    } else {
        params.host.clone()
    };

    let bad_host = || SessionError::invalid("host", "does not form a valid endpoint");
    let mut url = Url::parse(&format!("{scheme}://{host}:{}/", params.port)).map_err(|_| bad_host())?;

    {
        let mut segments = url.path_segments_mut().map_err(|_| bad_host())?;
        segments
            .pop_if_empty()
            .extend(app_path.split('/').filter(|s| !s.is_empty()))
            .push(ROOMS_SEGMENT)
            .push(&params.room);
    }

    {
        let mut query = url.query_pairs_mut();
        query.append_pair(USER_ID_PARAM, &params.user_id);
        if let Some(id) = resume {
            query.append_key_only(REJOIN_PARAM);
            query.append_pair(LAST_EVENT_ID_PARAM, id.as_str());
        }
    }

    Ok(url)
}
