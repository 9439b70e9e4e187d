//! Mojang session-server interactions: the session-join handshake, profile
//! fetch and username lookup used by the login pipeline. Mojang's legacy
//! password `/authenticate` endpoint is gone; `msauth` drives the Microsoft/
//! Xbox chain that produces the `access_token`/`selected_profile` this
//! module's requests need.

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::errors::*;

pub const JOIN_SERVER: &str = "https://sessionserver.mojang.com/session/minecraft/join";
pub const PROFILE_SERVER: &str = "https://sessionserver.mojang.com/session/minecraft/profile";
pub const NAME_LOOKUP: &str = "https://api.mojang.com/users/profiles/minecraft";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub signature: Option<String>,
}

/// A Mojang profile as returned by the session server, including the skin/
/// cape `properties` the broadcast peer login ritual re-sends for the
/// owner's avatar (§4.G step 6).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<ProfileProperty>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct JoinServerRequest<'a> {
    access_token: &'a str,
    selected_profile: &'a str,
    server_id: String,
}

/// Computes the session-join server hash (sha1 of server id, shared secret
/// and public key, formatted with Mojang's nonstandard signed-hex digest)
/// and posts it to the session server. Expects a 204 response.
pub fn join_server(
    access_token: &str,
    selected_profile: &str,
    server_id: &str,
    shared_secret: &[u8],
    public_key: &[u8],
) -> TetsuResult<()> {
    let mut hasher = crypto::Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key);
    let hash = crypto::hexdigest(hasher);

    let body = JoinServerRequest {
        access_token,
        selected_profile,
        server_id: hash,
    };

    let res = ureq::post(JOIN_SERVER)
        .set("content-type", "application/json")
        .send_string(&serde_json::to_string(&body)?)?;

    if res.status() != 204 {
        return Err(Error::Http(format!(
            "session join returned status {}",
            res.status()
        )));
    }
    Ok(())
}

/// Fetches a profile (with skin/cape properties) by uuid.
pub fn fetch_profile(uuid: &str) -> TetsuResult<Profile> {
    let url = format!("{}/{}?unsigned=false", PROFILE_SERVER, uuid);
    let body = ureq::get(&url).call()?.into_string()?;
    Ok(serde_json::from_str(&body)?)
}

#[derive(Deserialize)]
struct NameLookupResponse {
    id: String,
}

/// Looks up the current uuid for a username (used by the credential-file
/// offline-uuid fallback when a peer hasn't yet completed Microsoft auth).
pub fn lookup_uuid(username: &str) -> TetsuResult<String> {
    let url = format!("{}/{}", NAME_LOOKUP, username);
    let body = ureq::get(&url).call()?.into_string()?;
    let parsed: NameLookupResponse = serde_json::from_str(&body)?;
    Ok(parsed.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_deserializes_with_properties() {
        let json = r#"{"id":"069a79f444e94726a5befca90e38aaf9","name":"Notch","properties":[{"name":"textures","value":"abc","signature":"sig"}]}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.name, "Notch");
        assert_eq!(profile.properties.len(), 1);
        assert_eq!(profile.properties[0].signature.as_deref(), Some("sig"));
    }

    #[test]
    fn profile_deserializes_without_properties() {
        let json = r#"{"id":"069a79f444e94726a5befca90e38aaf9","name":"Notch"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert!(profile.properties.is_empty());
    }
}
