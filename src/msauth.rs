//! Microsoft/Xbox/Minecraft device-code and refresh-token login chain.
//!
//! Translated from `original_source/auth/ms.py` into synchronous `ureq`
//! calls, dropping that file's interactive password/PPFT-scraping path in
//! favour of the device-code flow (the only headless-friendly option MSA
//! still supports): MSA token -> Xbox Live -> XSTS -> Minecraft ->
//! entitlements -> profile.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::*;

const LIVE_DEVICE_CODE: &str =
    "https://login.microsoftonline.com/consumers/oauth2/v2.0/devicecode";
const LIVE_TOKEN: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
const XBL_USER_AUTH: &str = "https://user.auth.xboxlive.com/user/authenticate";
const XSTS_AUTHORIZE: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
const MC_LOGIN_WITH_XBOX: &str = "https://api.minecraftservices.com/authentication/login_with_xbox";
const MC_ENTITLEMENTS: &str = "https://api.minecraftservices.com/entitlements/mcstore";
const MC_PROFILE: &str = "https://api.minecraftservices.com/minecraft/profile";

/// The Azure application id tetsu-derived proxies have historically
/// registered under for this flow; any client id with device-code and
/// XboxLive.signin scopes granted works here.
const CLIENT_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Deserialize, Debug)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
}

/// Starts the device-code flow. The caller is responsible for surfacing
/// `user_code`/`verification_uri` to the operator (§1: a chat line or log
/// line, nothing richer).
pub fn start_device_code(scope: &str) -> TetsuResult<DeviceCodeResponse> {
    let body = ureq::post(LIVE_DEVICE_CODE)
        .send_form(&[("client_id", CLIENT_ID), ("scope", scope)])?
        .into_string()?;
    Ok(serde_json::from_str(&body)?)
}

#[derive(Deserialize, Debug, Clone)]
pub struct MsaToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

#[derive(Deserialize, Debug)]
struct TokenErrorResponse {
    error: String,
}

/// Polls the token endpoint at `device.interval` seconds until the user
/// completes the browser-side flow or the code expires. `authorization_pending`
/// is the expected in-progress response, not an error.
pub fn poll_device_code(device: &DeviceCodeResponse) -> TetsuResult<MsaToken> {
    let deadline = Duration::from_secs(device.expires_in);
    let started = std::time::Instant::now();
    let interval = Duration::from_secs(device.interval.max(1));

    loop {
        if started.elapsed() > deadline {
            return Err(Error::Auth(AuthErrorKind::InteractiveChallengeRequired));
        }

        let res = ureq::post(LIVE_TOKEN).send_form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ("client_id", CLIENT_ID),
            ("device_code", &device.device_code),
        ]);

        match res {
            Ok(r) => return Ok(serde_json::from_str(&r.into_string()?)?),
            Err(ureq::Error::Status(_, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let parsed: TokenErrorResponse = serde_json::from_str(&body)
                    .unwrap_or(TokenErrorResponse { error: body });
                match parsed.error.as_str() {
                    "authorization_pending" | "slow_down" => {
                        thread::sleep(interval);
                        continue;
                    }
                    "expired_token" => {
                        return Err(Error::Auth(AuthErrorKind::InteractiveChallengeRequired))
                    }
                    other => return Err(Error::Http(other.to_owned())),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Exchanges a previously-cached refresh token for a fresh MSA token,
/// without re-running the device-code flow. Used when a cached credential's
/// `issued_at` is more than 23 hours old (§4.I).
pub fn refresh_ms_token(refresh_token: &str) -> TetsuResult<MsaToken> {
    let res = ureq::post(LIVE_TOKEN)
        .send_form(&[
            ("grant_type", "refresh_token"),
            ("client_id", CLIENT_ID),
            ("refresh_token", refresh_token),
        ])
        .map_err(|e| match e {
            ureq::Error::Status(400, _) => Error::Auth(AuthErrorKind::RefreshExpired),
            other => other.into(),
        })?;
    Ok(serde_json::from_str(&res.into_string()?)?)
}

#[derive(Serialize)]
struct XblProperties<'a> {
    #[serde(rename = "AuthMethod")]
    auth_method: &'a str,
    #[serde(rename = "SiteName")]
    site_name: &'a str,
    #[serde(rename = "RpsTicket")]
    rps_ticket: String,
}

#[derive(Serialize)]
struct XblAuthRequest<'a> {
    #[serde(rename = "Properties")]
    properties: XblProperties<'a>,
    #[serde(rename = "RelyingParty")]
    relying_party: &'a str,
    #[serde(rename = "TokenType")]
    token_type: &'a str,
}

#[derive(Deserialize, Debug)]
struct XblClaims {
    xui: Vec<XblUserHash>,
}

#[derive(Deserialize, Debug)]
struct XblUserHash {
    uhs: String,
}

#[derive(Deserialize, Debug)]
struct XblResponse {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "DisplayClaims")]
    display_claims: XblClaims,
}

/// A token plus the Xbox user hash it came with, as consumed by the next
/// link of the chain.
#[derive(Debug, Clone)]
pub struct XboxToken {
    pub token: String,
    pub user_hash: String,
}

pub fn xbl_authenticate(msa_access_token: &str) -> TetsuResult<XboxToken> {
    let req = XblAuthRequest {
        properties: XblProperties {
            auth_method: "RPS",
            site_name: "user.auth.xboxlive.com",
            rps_ticket: format!("d={}", msa_access_token),
        },
        relying_party: "http://auth.xboxlive.com",
        token_type: "JWT",
    };
    let body = ureq::post(XBL_USER_AUTH)
        .set("content-type", "application/json")
        .set("accept", "application/json")
        .send_string(&serde_json::to_string(&req)?)?
        .into_string()?;
    let parsed: XblResponse = serde_json::from_str(&body)?;
    let user_hash = parsed
        .display_claims
        .xui
        .into_iter()
        .next()
        .map(|x| x.uhs)
        .ok_or_else(|| Error::Auth(AuthErrorKind::NoXboxProfile))?;
    Ok(XboxToken {
        token: parsed.token,
        user_hash,
    })
}

#[derive(Serialize)]
struct XstsAuthRequest<'a> {
    #[serde(rename = "Properties")]
    properties: XstsProperties<'a>,
    #[serde(rename = "RelyingParty")]
    relying_party: &'a str,
    #[serde(rename = "TokenType")]
    token_type: &'a str,
}

#[derive(Serialize)]
struct XstsProperties<'a> {
    #[serde(rename = "SandboxId")]
    sandbox_id: &'a str,
    #[serde(rename = "UserTokens")]
    user_tokens: Vec<&'a str>,
}

#[derive(Deserialize, Debug)]
struct XstsErrorResponse {
    #[serde(rename = "XErr")]
    x_err: u64,
}

pub fn xsts_authorize(xbl_token: &XboxToken) -> TetsuResult<XboxToken> {
    let req = XstsAuthRequest {
        properties: XstsProperties {
            sandbox_id: "RETAIL",
            user_tokens: vec![&xbl_token.token],
        },
        relying_party: "rp://api.minecraftservices.com/",
        token_type: "JWT",
    };

    let res = ureq::post(XSTS_AUTHORIZE)
        .set("content-type", "application/json")
        .set("accept", "application/json")
        .send_string(&serde_json::to_string(&req)?);

    let res = match res {
        Ok(r) => r,
        Err(ureq::Error::Status(401, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            let parsed: XstsErrorResponse =
                serde_json::from_str(&body).unwrap_or(XstsErrorResponse { x_err: 0 });
            return Err(match parsed.x_err {
                2148916238 => Error::Auth(AuthErrorKind::ChildAccount),
                2148916233 => Error::Auth(AuthErrorKind::NoXboxProfile),
                _ => Error::Http(format!("XSTS authorize failed: {}", body)),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let body = res.into_string()?;
    let parsed: XblResponse = serde_json::from_str(&body)?;
    let user_hash = parsed
        .display_claims
        .xui
        .into_iter()
        .next()
        .map(|x| x.uhs)
        .ok_or_else(|| Error::Auth(AuthErrorKind::NoXboxProfile))?;
    Ok(XboxToken {
        token: parsed.token,
        user_hash,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct McLoginRequest {
    identity_token: String,
}

#[derive(Deserialize, Debug)]
pub struct McAuthResponse {
    pub access_token: String,
}

pub fn mc_login_with_xbox(xsts: &XboxToken) -> TetsuResult<McAuthResponse> {
    let req = McLoginRequest {
        identity_token: format!("XBL3.0 x={};{}", xsts.user_hash, xsts.token),
    };
    let body = ureq::post(MC_LOGIN_WITH_XBOX)
        .set("content-type", "application/json")
        .send_string(&serde_json::to_string(&req)?)?
        .into_string()?;
    Ok(serde_json::from_str(&body)?)
}

#[derive(Deserialize, Debug)]
struct EntitlementsResponse {
    items: Vec<serde_json::Value>,
}

/// Checks that the account owns Minecraft: Java Edition. A 404/empty-items
/// response surfaces as `Error::Auth(AuthErrorKind::NotPremium)`.
pub fn check_entitlements(mc_access_token: &str) -> TetsuResult<()> {
    let body = ureq::get(MC_ENTITLEMENTS)
        .set("authorization", &format!("Bearer {}", mc_access_token))
        .call()?
        .into_string()?;
    let parsed: EntitlementsResponse = serde_json::from_str(&body)?;
    if parsed.items.is_empty() {
        return Err(Error::Auth(AuthErrorKind::NotPremium));
    }
    Ok(())
}

#[derive(Deserialize, Debug, Clone)]
pub struct McProfile {
    pub id: String,
    pub name: String,
}

pub fn fetch_mc_profile(mc_access_token: &str) -> TetsuResult<McProfile> {
    let res = ureq::get(MC_PROFILE)
        .set("authorization", &format!("Bearer {}", mc_access_token))
        .call();
    let res = match res {
        Ok(r) => r,
        Err(ureq::Error::Status(404, _)) => return Err(Error::Auth(AuthErrorKind::NotPremium)),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&res.into_string()?)?)
}

/// Runs the full chain: Microsoft token (from device-code or refresh) ->
/// Xbox Live -> XSTS -> Minecraft login -> entitlements -> profile.
/// Returns the Minecraft access token and profile the rest of the login
/// pipeline needs.
pub fn login_with_msa_token(msa_access_token: &str) -> TetsuResult<(McAuthResponse, McProfile)> {
    let xbl = xbl_authenticate(msa_access_token)?;
    let xsts = xsts_authorize(&xbl)?;
    let mc = mc_login_with_xbox(&xsts)?;
    check_entitlements(&mc.access_token)?;
    let profile = fetch_mc_profile(&mc.access_token)?;
    Ok((mc, profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_code_response_parses() {
        let json = r#"{"device_code":"abc","user_code":"XYZ-123","verification_uri":"https://microsoft.com/devicelogin","expires_in":900,"interval":5}"#;
        let parsed: DeviceCodeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.user_code, "XYZ-123");
        assert_eq!(parsed.interval, 5);
    }

    #[test]
    fn xbl_response_extracts_user_hash() {
        let json = r#"{"Token":"tok","DisplayClaims":{"xui":[{"uhs":"deadbeef"}]}}"#;
        let parsed: XblResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.display_claims.xui[0].uhs, "deadbeef");
        assert_eq!(parsed.token, "tok");
    }

    #[test]
    fn entitlements_response_with_no_items_is_not_premium() {
        let json = r#"{"items":[]}"#;
        let parsed: EntitlementsResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.items.is_empty());
    }
}
