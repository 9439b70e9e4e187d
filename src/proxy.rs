//! Top-level runner: resolves the owner's identity, drives the upstream and
//! downstream halves of login, then hands the split streams to a
//! [`session::Session`] and keeps running whatever it `transfer_to`s.
//! Separately, runs the broadcast peer listener for the lifetime of each
//! owner session.
//!
//! Grounded on `original_source/core/proxy.py`'s module-level `main()` and
//! `original_source/broadcasting/server.py`'s accept loop.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::broadcast::peer::{
    post_compression_sequence, pre_compression_sequence, PEER_ENTITY_ID,
    SPECTATOR_COMPRESSION_THRESHOLD, SPECTATOR_MAX_PLAYERS,
};
use crate::broadcast::PeerHandle;
use crate::cache::{self, ServerCache};
use crate::config::{AuthConfig, ProxyConfig};
use crate::credentials::{Credential, CredentialStore};
use crate::crypto;
use crate::dispatch::Dispatcher;
use crate::errors::*;
use crate::event::EventDirection::ServerBound;
use crate::event::EventState;
use crate::eventbus::{EventBus, Payload};
use crate::login;
use crate::mojang;
use crate::msauth;
use crate::session::{Session, Shared};
use crate::stream::Stream;
use crate::versions::common::{Uuid, VarInt};
use crate::versions::v47::{Event, LoginSuccess, PlaySetCompression, StatusPong, StatusResponse};

/// Runs the proxy forever: one owner at a time, each accepted connection on
/// `listen_addr` starting a fresh login+session cycle.
pub fn run() -> TetsuResult<()> {
    crate::config::init_logging();

    let proxy_cfg = ProxyConfig::from_env()?;
    let auth_cfg = AuthConfig::from_env()?;
    let store = CredentialStore::open()?;

    let (owner_username, owner_uuid_str, access_token) = resolve_identity(&auth_cfg, &store)?;
    let owner_uuid = login::parse_mc_uuid(&owner_uuid_str)?;

    let cache = match cache::default_cache_path() {
        Some(path) => ServerCache::load_from(&path)?,
        None => ServerCache::new(),
    };

    let listener = TcpListener::bind(proxy_cfg.listen_addr)?;
    info!(
        "listening on {} as {} ({})",
        proxy_cfg.listen_addr, owner_username, owner_uuid_str
    );

    for incoming in listener.incoming() {
        let socket = match incoming {
            Ok(s) => s,
            Err(e) => {
                warn!("accept on main listener failed: {}", e);
                continue;
            }
        };

        if let Err(e) = handle_owner(
            &proxy_cfg,
            &owner_username,
            owner_uuid,
            &access_token,
            &cache,
            socket,
        ) {
            error!("owner session ended: {}", e);
        }
    }

    Ok(())
}

/// Resolves the credential chain for `auth` into `(username, uuid, access_token)`.
/// Microsoft accounts use a cached/refreshed credential when available and
/// only fall back to the interactive device-code flow when there's no
/// cached refresh token or the cached one has expired (§4.I).
fn resolve_identity(
    auth: &AuthConfig,
    store: &CredentialStore,
) -> TetsuResult<(String, String, String)> {
    match auth {
        AuthConfig::Offline { username } => {
            let uuid = mojang::lookup_uuid(username).unwrap_or_else(|e| {
                warn!("uuid lookup for {} failed, using a nil uuid: {}", username, e);
                "00000000000000000000000000000000".to_owned()
            });
            Ok((username.clone(), uuid, String::new()))
        }
        AuthConfig::Microsoft { username } => match store.load(username)? {
            Some(cred) if !cred.is_stale() => {
                Ok((username.clone(), cred.uuid, cred.access_token))
            }
            Some(cred) => match msauth::refresh_ms_token(&cred.refresh_token) {
                Ok(msa) => finish_msa_login(username, &msa, store),
                Err(Error::Auth(AuthErrorKind::RefreshExpired)) => {
                    warn!("cached session for {} expired, restarting device-code login", username);
                    device_code_login(username, store)
                }
                Err(e) => Err(e),
            },
            None => device_code_login(username, store),
        },
    }
}

fn device_code_login(
    username: &str,
    store: &CredentialStore,
) -> TetsuResult<(String, String, String)> {
    let device = msauth::start_device_code("XboxLive.signin offline_access")?;
    info!(
        "sign in at {} with code {} to authorize {}",
        device.verification_uri, device.user_code, username
    );
    let msa = msauth::poll_device_code(&device)?;
    finish_msa_login(username, &msa, store)
}

fn finish_msa_login(
    username: &str,
    msa: &msauth::MsaToken,
    store: &CredentialStore,
) -> TetsuResult<(String, String, String)> {
    let (mc, profile) = msauth::login_with_msa_token(&msa.access_token)?;
    let credential = Credential::new(mc.access_token.clone(), msa.refresh_token.clone(), profile.id.clone());
    store.save(username, &credential)?;
    Ok((profile.name, profile.id, mc.access_token))
}

/// Drives one owner connection end to end: the local client's handshake,
/// the upstream server's login, then the session pump until the client
/// disconnects (or transfers through a chain of sessions). Spawns the
/// broadcast peer listener alongside it.
fn handle_owner(
    cfg: &ProxyConfig,
    owner_username: &str,
    owner_uuid: Uuid,
    access_token: &str,
    cache: &ServerCache,
    client_socket: TcpStream,
) -> TetsuResult<()> {
    let downstream = match login::login_downstream(
        client_socket,
        owner_username,
        owner_uuid,
        cfg.compression_threshold,
    )? {
        Some(d) => d,
        None => return Ok(()),
    };

    let upstream = login::login_upstream(
        &cfg.upstream_host,
        cfg.upstream_port,
        &cfg.fake_host,
        cfg.fake_port,
        owner_username,
        &owner_uuid.to_string().replace('-', ""),
        access_token,
        cache,
    )?;
    info!("upstream session established as {}", upstream.username);

    let bus = Arc::new(EventBus::new());
    let dispatcher = Arc::new(Dispatcher::new());
    let shared = Arc::new(Shared::new(bus, dispatcher));

    {
        let peer_shared = shared.clone();
        let broadcast_addr = cfg.broadcast_listen_addr;
        let owner_username = owner_username.to_owned();
        thread::spawn(move || {
            if let Err(e) = accept_peers(peer_shared, broadcast_addr, owner_uuid, owner_username) {
                warn!("broadcast listener ended: {}", e);
            }
        });
    }

    let (client_read, client_write) = downstream.stream.split()?;
    let (server_read, server_write) = upstream.stream.split()?;

    let mut session = Some(Session::new(
        shared,
        client_read,
        client_write,
        server_read,
        server_write,
    ));
    while let Some(s) = session.take() {
        session = s.run()?;
    }
    Ok(())
}

/// Accepts broadcast peers for one owner session's lifetime. Polls a
/// non-blocking listener instead of a blocking `incoming()` loop so it can
/// notice `shared`'s closed flag without a dedicated shutdown socket.
fn accept_peers(
    shared: Arc<Shared>,
    addr: SocketAddr,
    owner_uuid: Uuid,
    owner_username: String,
) -> TetsuResult<()> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    info!("broadcast listener on {}", addr);

    let mut next_peer_id: u64 = 1;
    while !shared.is_closed() {
        match listener.accept() {
            Ok((socket, peer_addr)) => {
                let peer_id = next_peer_id;
                next_peer_id += 1;
                let shared = shared.clone();
                let owner_username = owner_username.clone();
                info!("broadcast peer {} connecting from {}", peer_id, peer_addr);
                thread::spawn(move || {
                    if let Err(e) = handle_peer(shared, socket, peer_id, owner_uuid, owner_username)
                    {
                        warn!("broadcast peer {} failed: {}", peer_id, e);
                    }
                });
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(200));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Runs the spectator-join ritual (§4.G/§4.H) for one accepted peer socket,
/// then holds the connection open long enough to notice a disconnect —
/// nothing the peer sends serverbound goes anywhere, there's no upstream
/// socket behind a broadcast peer.
fn handle_peer(
    shared: Arc<Shared>,
    socket: TcpStream,
    peer_id: u64,
    owner_uuid: Uuid,
    owner_username: String,
) -> TetsuResult<()> {
    let mut stream = Stream::new(socket);

    let handshake = match login::read_event(&mut stream, ServerBound, EventState::Handshake)? {
        Event::Handshake(h) => h,
        other => {
            return Err(Error::WireMalformed(format!(
                "expected handshake, got {:?}",
                other
            )))
        }
    };

    match handshake.next_state.0 {
        1 => respond_peer_status(&mut stream, &shared, &owner_username),
        2 => join_peer(stream, shared, peer_id, owner_uuid),
        other => Err(Error::WireMalformed(format!(
            "unexpected handshake next_state {}",
            other
        ))),
    }
}

fn respond_peer_status(stream: &mut Stream, shared: &Arc<Shared>, owner_username: &str) -> TetsuResult<()> {
    match login::read_event(stream, ServerBound, EventState::Status)? {
        Event::StatusRequest(_) => {}
        other => {
            return Err(Error::WireMalformed(format!(
                "expected status request, got {:?}",
                other
            )))
        }
    }

    let online = shared.peers.lock().unwrap().len();
    let body = serde_json::json!({
        "version": { "name": "1.8.9", "protocol": login::PROTOCOL_VERSION },
        "players": { "max": SPECTATOR_MAX_PLAYERS, "online": online, "sample": [] },
        "description": { "text": format!("watching {}", owner_username) },
    });
    login::send(
        stream,
        &Event::StatusResponse(StatusResponse {
            response: body.to_string(),
        }),
    )?;

    match login::read_event(stream, ServerBound, EventState::Status) {
        Ok(Event::StatusPing(p)) => login::send(stream, &Event::StatusPong(StatusPong { payload: p.payload })),
        _ => Ok(()),
    }
}

fn join_peer(
    mut stream: Stream,
    shared: Arc<Shared>,
    peer_id: u64,
    owner_uuid: Uuid,
) -> TetsuResult<()> {
    let login_start = match login::read_event(&mut stream, ServerBound, EventState::Login)? {
        Event::LoginStart(p) => p,
        other => {
            return Err(Error::WireMalformed(format!(
                "expected login start, got {:?}",
                other
            )))
        }
    };
    let peer_username = login_start.name;
    let peer_uuid = resolve_peer_uuid(&peer_username);

    login::send(
        &mut stream,
        &Event::LoginSuccess(LoginSuccess {
            uuid: login::mc_uuid_string(peer_uuid),
            name: peer_username.clone(),
        }),
    )?;

    {
        let gs = shared.gamestate.lock().unwrap();
        for event in pre_compression_sequence(&gs, PEER_ENTITY_ID) {
            login::send(&mut stream, &event)?;
        }
    }

    // §4.G step 5: the real Play-state Set Compression signal (wire id
    // 0x46, not the Login-state 0x03 struct), sent uncompressed. The
    // compression flag itself isn't flipped until the peer's client has
    // acknowledged it, mirroring `compression_ready.wait()` in
    // `original_source/broadcasting/plugins/login.py`.
    login::send(
        &mut stream,
        &Event::PlaySetCompression(PlaySetCompression {
            threshold: VarInt(SPECTATOR_COMPRESSION_THRESHOLD),
        }),
    )?;
    stream.read_packet()?;
    stream.set_compression(SPECTATOR_COMPRESSION_THRESHOLD);
    {
        let gs = shared.gamestate.lock().unwrap();
        let mut transformer = shared.transformer.lock().unwrap();
        let events =
            post_compression_sequence(&gs, &mut transformer, owner_uuid, peer_uuid, &peer_username)?;
        for event in &events {
            login::send(&mut stream, event)?;
        }
    }

    shared.bus.emit(
        "chat:owner",
        Arc::new(format!("{} started spectating", peer_username)) as Payload,
    );

    let (mut peer_read, peer_write) = stream.split()?;
    {
        let mut peer = PeerHandle::new(peer_id, peer_write);
        peer.avatar_spawned = true;
        shared.peers.lock().unwrap().push(peer);
    }

    loop {
        match peer_read.read_packet() {
            Ok(_) => {}
            Err(_) => break,
        }
        if shared.is_closed() {
            break;
        }
    }

    shared.peers.lock().unwrap().retain(|p| p.id != peer_id);
    shared.bus.emit(
        "chat:owner",
        Arc::new(format!("{} stopped spectating", peer_username)) as Payload,
    );
    Ok(())
}

/// Looks the peer's real uuid up from Mojang; falls back to [`offline_uuid`]
/// when the lookup fails (unknown name, rate limit, offline dev server).
fn resolve_peer_uuid(username: &str) -> Uuid {
    if let Ok(id) = mojang::lookup_uuid(username) {
        if let Ok(uuid) = login::parse_mc_uuid(&id) {
            return uuid;
        }
    }
    offline_uuid(username)
}

/// A deterministic name-derived uuid, the same shape as vanilla's
/// offline-mode uuid but hashed with the sha1 this crate already carries
/// rather than adding an md5 dependency solely for this fallback.
fn offline_uuid(username: &str) -> Uuid {
    let mut hasher = crypto::Sha1::new();
    hasher.update(format!("OfflinePlayer:{}", username).as_bytes());
    let digest = hasher.finish();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[0..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x30;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_u128(u128::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_uuid_is_deterministic() {
        let a = offline_uuid("watcher");
        let b = offline_uuid("watcher");
        assert_eq!(a, b);
    }

    #[test]
    fn offline_uuid_differs_by_name() {
        assert_ne!(offline_uuid("watcher"), offline_uuid("someone_else"));
    }
}
