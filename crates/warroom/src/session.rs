//! Session identity and endpoint derivation.

use reqwest::Url;

use crate::config::{ClientConfig, parse_server_url};
use crate::error::{WarroomError, WarroomResult};

const WS_PATH: &str = "api/ws";
const EVENTS_PATH: &str = "api/events";

/// The (room, member, server) triple a client reports under.
///
/// Immutable for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    room: String,
    member: String,
    server: Url,
}

impl Session {
    pub fn new(
        room: impl Into<String>,
        member: impl Into<String>,
        server: &str,
    ) -> WarroomResult<Self> {
        Ok(Self {
            room: room.into(),
            member: member.into(),
            server: parse_server_url(server)?,
        })
    }

    pub fn from_config(config: &ClientConfig) -> WarroomResult<Self> {
        Self::new(config.room.clone(), config.member.clone(), &config.server)
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    /// Real-time endpoint: `ws(s)://<server>/api/ws?room=<room>&member=<member>`.
    pub fn realtime_url(&self) -> WarroomResult<Url> {
        let mut url = join_path(&self.server, WS_PATH);
        let scheme = match self.server.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| WarroomError::InvalidServerUrl {
                url: self.server.to_string(),
                message: format!("cannot switch scheme to {scheme}"),
            })?;
        url.query_pairs_mut()
            .clear()
            .append_pair("room", &self.room)
            .append_pair("member", &self.member);
        Ok(url)
    }

    /// Fallback endpoint: `<server>/api/events`.
    pub fn events_url(&self) -> Url {
        join_path(&self.server, EVENTS_PATH)
    }
}

fn join_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!("{}/{}", base.path().trim_end_matches('/'), path);
    url.set_path(&joined);
    url.set_query(None);
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_url_swaps_scheme() {
        let session = Session::new("hack-room", "amadeus", "http://localhost:3000").unwrap();
        assert_eq!(
            session.realtime_url().unwrap().as_str(),
            "ws://localhost:3000/api/ws?room=hack-room&member=amadeus"
        );

        let session = Session::new("r", "m", "https://warroom.example.com").unwrap();
        assert_eq!(
            session.realtime_url().unwrap().as_str(),
            "wss://warroom.example.com/api/ws?room=r&member=m"
        );
    }

    #[test]
    fn test_urls_keep_path_prefix_and_encode_query() {
        let session = Session::new("team a", "zoë", "https://host.example/warroom/").unwrap();
        assert_eq!(
            session.events_url().as_str(),
            "https://host.example/warroom/api/events"
        );
        assert_eq!(
            session.realtime_url().unwrap().as_str(),
            "wss://host.example/warroom/api/ws?room=team+a&member=zo%C3%AB"
        );
    }

    #[test]
    fn test_rejects_unparsable_server() {
        assert!(Session::new("r", "m", "not a url").is_err());
    }
}
