//! Login pipeline: the outbound Mojang session-encryption handshake this
//! proxy drives against the real server on the owner's behalf, and the
//! lightweight inbound handshake the owner's own client goes through
//! against the proxy itself.
//!
//! The outbound leg is grounded on the deleted `client::connect_user` flow
//! this crate's teacher used to drive directly: handshake, `LoginStart`,
//! RSA-wrap a fresh shared secret after a session-join round trip to
//! Mojang, enable the stream cipher, then ride out `SetCompression` until
//! `LoginSuccess`.
//!
//! The inbound leg never reaches for a second Mojang identity: the local
//! client connecting through the proxy *is* the owner, on the same
//! machine, so it's simply handed the identity the outbound leg already
//! authenticated as rather than running its own `hasJoined` verification
//! or minting an offline UUID of its own.

use std::io;
use std::net::TcpStream;

use log::info;

use crate::cache::{CachedServer, ServerCache};
use crate::crypto::{self, Rsa};
use crate::errors::*;
use crate::event::EventDirection::{ClientBound, ServerBound};
use crate::event::EventState;
use crate::mojang;
use crate::serialization::Readable;
use crate::stream::Stream;
use crate::versions::common::{Uuid, VarInt};
use crate::versions::v47::{
    decode, encode_framed, EncryptionResponse, Event, Handshake, LoginStart, LoginSuccess,
    SetCompression, StatusPong, StatusResponse,
};

pub(crate) const PROTOCOL_VERSION: i32 = 47;

pub(crate) fn send(stream: &mut Stream, event: &Event) -> TetsuResult<()> {
    let frame = encode_framed(event)?;
    stream.write_packet(&frame)
}

pub(crate) fn read_event(stream: &mut Stream, direction: crate::event::EventDirection, state: EventState) -> TetsuResult<Event> {
    let raw = stream.read_packet()?;
    let mut cursor = io::Cursor::new(&raw);
    let id = VarInt::read_from(&mut cursor)?.0;
    decode(direction, state, id, &mut cursor)
}

/// Parses a Mojang-flavored uuid string (32 hex chars, with or without the
/// usual dashes — `LoginSuccess` sends it undashed) into a [`Uuid`].
pub(crate) fn parse_mc_uuid(s: &str) -> TetsuResult<Uuid> {
    let hex: String = s.chars().filter(|c| *c != '-').collect();
    let value = u128::from_str_radix(&hex, 16)
        .map_err(|_| Error::WireMalformed(format!("not a uuid: {}", s)))?;
    Ok(Uuid::from_u128(value))
}

/// What the outbound login resolved to: the live, encrypted/compressed
/// stream to the real server, plus the identity it logged in as (Mojang
/// normally just echoes back the identity the session-join call already
/// asserted, but the wire value is authoritative).
pub struct UpstreamLogin {
    pub stream: Stream,
    pub uuid: Uuid,
    pub username: String,
}

/// Drives the full login handshake against `host:port` as `profile_name`/
/// `profile_uuid`, authenticated by `access_token` (§4.B/§4.I's credential
/// lifecycle). `handshake_host`/`handshake_port` are sent as the handshake's
/// address fields instead of `host`/`port` when a server validates an
/// SNI-like address distinct from where it's actually dialed. `cache` is
/// opportunistically updated with the server's public key/server-id pair;
/// nothing here depends on a cache hit, since a fresh `verify_token` is
/// required on every login regardless.
#[allow(clippy::too_many_arguments)]
pub fn login_upstream(
    host: &str,
    port: u16,
    handshake_host: &str,
    handshake_port: u16,
    profile_name: &str,
    profile_uuid: &str,
    access_token: &str,
    cache: &ServerCache,
) -> TetsuResult<UpstreamLogin> {
    let socket = TcpStream::connect((host, port))?;
    let mut stream = Stream::new(socket);

    send(
        &mut stream,
        &Event::Handshake(Handshake {
            protocol_version: VarInt(PROTOCOL_VERSION),
            server_address: handshake_host.to_owned(),
            server_port: handshake_port,
            next_state: VarInt(2),
        }),
    )?;
    send(
        &mut stream,
        &Event::LoginStart(LoginStart {
            name: profile_name.to_owned(),
        }),
    )?;

    loop {
        match read_event(&mut stream, ClientBound, EventState::Login)? {
            Event::Disconnect(p) => {
                return Err(Error::Disconnected(p.reason.flatten()));
            }
            Event::EncryptionRequest(req) => {
                let public_key = req.public_key.1;
                let verify_token = req.verify_token.1;

                cache.put(
                    host,
                    port,
                    CachedServer {
                        server_id: req.server_id.clone(),
                        public_key: public_key.clone(),
                    },
                );

                let mut shared_secret = [0u8; 16];
                crypto::generate_key(&mut shared_secret);

                mojang::join_server(
                    access_token,
                    profile_uuid,
                    &req.server_id,
                    &shared_secret,
                    &public_key,
                )?;

                let rsa_public = Rsa::public_key_from_der(&public_key)?;
                let encrypted_secret = crypto::public_encrypt(&rsa_public, &shared_secret)?;
                let encrypted_verify = crypto::public_encrypt(&rsa_public, &verify_token)?;

                send(
                    &mut stream,
                    &Event::EncryptionResponse(EncryptionResponse {
                        shared_secret: crate::versions::common::ByteArrayVarInt(
                            encrypted_secret.len(),
                            encrypted_secret,
                        ),
                        verify_token: crate::versions::common::ByteArrayVarInt(
                            encrypted_verify.len(),
                            encrypted_verify,
                        ),
                    }),
                )?;

                stream.enable_encryption(&shared_secret)?;
            }
            Event::SetCompression(p) => {
                stream.set_compression(p.threshold.0);
            }
            Event::LoginSuccess(p) => {
                info!("logged in to {}:{} as {}", host, port, p.name);
                return Ok(UpstreamLogin {
                    uuid: parse_mc_uuid(&p.uuid)?,
                    username: p.name,
                    stream,
                });
            }
            _ => {}
        }
    }
}

/// What the inbound handshake resolved to. `None` when the connection was
/// a status ping and never reached login.
pub struct DownstreamLogin {
    pub stream: Stream,
}

/// Drives the proxy's server-side handshake against a freshly-accepted
/// local client socket. Status pings get a synthesized response; a login
/// attempt is always approved as `owner_username`/`owner_uuid` regardless
/// of the name the client's own `LoginStart` carried, since the local
/// client is a window into the owner's own upstream session, not a
/// separate identity.
pub fn login_downstream(
    socket: TcpStream,
    owner_username: &str,
    owner_uuid: Uuid,
    compression_threshold: i32,
) -> TetsuResult<Option<DownstreamLogin>> {
    let mut stream = Stream::new(socket);

    let handshake = match read_event(&mut stream, ServerBound, EventState::Handshake)? {
        Event::Handshake(h) => h,
        other => {
            return Err(Error::WireMalformed(format!(
                "expected handshake, got {:?}",
                other
            )))
        }
    };

    match handshake.next_state.0 {
        1 => {
            respond_status(&mut stream)?;
            Ok(None)
        }
        2 => {
            let _login_start = match read_event(&mut stream, ServerBound, EventState::Login)? {
                Event::LoginStart(p) => p,
                other => {
                    return Err(Error::WireMalformed(format!(
                        "expected login start, got {:?}",
                        other
                    )))
                }
            };

            if compression_threshold >= 0 {
                send(
                    &mut stream,
                    &Event::SetCompression(SetCompression {
                        threshold: VarInt(compression_threshold),
                    }),
                )?;
                stream.set_compression(compression_threshold);
            }

            send(
                &mut stream,
                &Event::LoginSuccess(LoginSuccess {
                    uuid: mc_uuid_string(owner_uuid),
                    name: owner_username.to_owned(),
                }),
            )?;

            Ok(Some(DownstreamLogin { stream }))
        }
        other => Err(Error::WireMalformed(format!(
            "unexpected handshake next_state {}",
            other
        ))),
    }
}

/// Formats a uuid the dashed `8-4-4-4-12` way a real client's `LoginSuccess`
/// parser expects, rather than the undashed form the server sends it in.
pub(crate) fn mc_uuid_string(uuid: Uuid) -> String {
    let b = uuid.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
    )
}

fn respond_status(stream: &mut Stream) -> TetsuResult<()> {
    match read_event(stream, ServerBound, EventState::Status)? {
        Event::StatusRequest(_) => {}
        other => {
            return Err(Error::WireMalformed(format!(
                "expected status request, got {:?}",
                other
            )))
        }
    }

    let body = serde_json::json!({
        "version": { "name": "1.8.9", "protocol": PROTOCOL_VERSION },
        "players": { "max": 1, "online": 0, "sample": [] },
        "description": { "text": "vitrum spectator proxy" },
    });
    send(
        stream,
        &Event::StatusResponse(StatusResponse {
            response: body.to_string(),
        }),
    )?;

    match read_event(stream, ServerBound, EventState::Status) {
        Ok(Event::StatusPing(p)) => send(stream, &Event::StatusPong(StatusPong { payload: p.payload })),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_undashed_mc_uuid() {
        let uuid = parse_mc_uuid("069a79f444e94726a5befca90e38aaf9").unwrap();
        assert_eq!(uuid.as_u128(), 0x069a79f444e94726a5befca90e38aaf9);
    }

    #[test]
    fn parses_dashed_mc_uuid() {
        let uuid = parse_mc_uuid("069a79f4-44e9-4726-a5be-fca90e38aaf9").unwrap();
        assert_eq!(uuid.as_u128(), 0x069a79f444e94726a5befca90e38aaf9);
    }

    #[test]
    fn mc_uuid_string_round_trips() {
        let uuid = Uuid::from_u128(0x069a79f444e94726a5befca90e38aaf9);
        let s = mc_uuid_string(uuid);
        assert_eq!(s, "069a79f4-44e9-4726-a5be-fca90e38aaf9");
        assert_eq!(parse_mc_uuid(&s).unwrap(), uuid);
    }
}
