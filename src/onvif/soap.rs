// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! SOAP envelope templates and WS-Security UsernameToken digests (§4.C,
//! §9 "keep SOAP as string templates; do not introduce a full XSD-bound
//! object model").

use base::strutil;
use jiff::Timestamp;
use rand::RngCore;
use sha1::{Digest, Sha1};

/// Builds the WS-Security `<Security>` header block for a username/digest
/// auth'd request: nonce (16 random bytes, base64), created timestamp
/// (UTC ISO-8601 `Z`), and `B64(SHA1(nonce ++ created ++ password))`.
pub fn security_header(username: &str, password: &str, now: Timestamp) -> String {
    let mut nonce_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, nonce_bytes);
    let created = now.strftime("%Y-%m-%dT%H:%M:%SZ").to_string();

    let mut hasher = Sha1::new();
    hasher.update(nonce_bytes);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let digest_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, digest);

    format!(
        r#"<wsse:Security soap:mustUnderstand="1" xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">
  <wsse:UsernameToken>
    <wsse:Username>{username}</wsse:Username>
    <wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{digest_b64}</wsse:Password>
    <wsse:Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{nonce_b64}</wsse:Nonce>
    <wsu:Created>{created}</wsu:Created>
  </wsse:UsernameToken>
</wsse:Security>"#
    )
}

pub fn envelope(security: Option<&str>, body: &str) -> String {
    let header = security
        .map(|s| format!("<soap:Header>{s}</soap:Header>"))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  {header}
  <soap:Body>{body}</soap:Body>
</soap:Envelope>"#
    )
}

pub fn get_profiles() -> &'static str {
    r#"<trt:GetProfiles xmlns:trt="http://www.onvif.org/ver10/media/wsdl"/>"#
}

pub fn get_stream_uri(profile_token: &str, transport: &str) -> String {
    format!(
        r#"<trt:GetStreamUri xmlns:trt="http://www.onvif.org/ver10/media/wsdl">
  <trt:StreamSetup>
    <tt:Stream xmlns:tt="http://www.onvif.org/ver10/schema">RTP-Unicast</tt:Stream>
    <tt:Transport xmlns:tt="http://www.onvif.org/ver10/schema">
      <tt:Protocol>{transport}</tt:Protocol>
    </tt:Transport>
  </trt:StreamSetup>
  <trt:ProfileToken>{profile_token}</trt:ProfileToken>
</trt:GetStreamUri>"#
    )
}

pub fn get_capabilities() -> &'static str {
    r#"<tds:GetCapabilities xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
  <tds:Category>All</tds:Category>
</tds:GetCapabilities>"#
}

pub fn continuous_move(profile_token: &str, x: f32, y: f32, zoom: f32) -> String {
    format!(
        r#"<tptz:ContinuousMove xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl">
  <tptz:ProfileToken>{profile_token}</tptz:ProfileToken>
  <tptz:Velocity>
    <tt:PanTilt xmlns:tt="http://www.onvif.org/ver10/schema" x="{x}" y="{y}"/>
    <tt:Zoom xmlns:tt="http://www.onvif.org/ver10/schema" x="{zoom}"/>
  </tptz:Velocity>
</tptz:ContinuousMove>"#
    )
}

pub fn stop(profile_token: &str) -> String {
    format!(
        r#"<tptz:Stop xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl">
  <tptz:ProfileToken>{profile_token}</tptz:ProfileToken>
  <tptz:PanTilt>true</tptz:PanTilt>
  <tptz:Zoom>true</tptz:Zoom>
</tptz:Stop>"#
    )
}

pub fn get_system_date_and_time() -> &'static str {
    r#"<tds:GetSystemDateAndTime xmlns:tds="http://www.onvif.org/ver10/device/wsdl"/>"#
}

pub fn set_system_date_and_time(now: Timestamp) -> String {
    let dt = now.strftime("%Y-%m-%dT%H:%M:%SZ");
    format!(
        r#"<tds:SetSystemDateAndTime xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
  <tds:DateTimeType>Manual</tds:DateTimeType>
  <tds:DaylightSavings>false</tds:DaylightSavings>
  <tds:UTCDateTime>
    <tt:Time xmlns:tt="http://www.onvif.org/ver10/schema">
      <tt:Hour>{h}</tt:Hour>
      <tt:Minute>{m}</tt:Minute>
      <tt:Second>{s}</tt:Second>
    </tt:Time>
    <tt:Date xmlns:tt="http://www.onvif.org/ver10/schema">
      <tt:Year>{y}</tt:Year>
      <tt:Month>{mo}</tt:Month>
      <tt:Day>{d}</tt:Day>
    </tt:Date>
  </tds:UTCDateTime>
</tds:SetSystemDateAndTime>"#,
        h = now.strftime("%H"),
        m = now.strftime("%M"),
        s = now.strftime("%S"),
        y = now.strftime("%Y"),
        mo = now.strftime("%m"),
        d = now.strftime("%d"),
    )
}

/// A WS-Discovery `Probe` envelope, sent unicast to each candidate host
/// (§4.D) rather than to the usual multicast group.
pub fn discovery_probe() -> String {
    let message_id = format!("urn:uuid:{}", strutil::hex(&rand_bytes(16)));
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"
               xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing"
               xmlns:wsdd="http://schemas.xmlsoap.org/ws/2005/04/discovery">
  <soap:Header>
    <wsa:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</wsa:Action>
    <wsa:MessageID>{message_id}</wsa:MessageID>
    <wsa:To>urn:schemas-xmlsoap-org:ws:2005:04:discovery</wsa:To>
  </soap:Header>
  <soap:Body>
    <wsdd:Probe>
      <wsdd:Types>tds:Device</wsdd:Types>
    </wsdd:Probe>
  </soap:Body>
</soap:Envelope>"#
    )
}

fn rand_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_header_contains_digest_and_nonce() {
        let h = security_header("admin", "hunter2", Timestamp::now());
        assert!(h.contains("<wsse:Password"));
        assert!(h.contains("<wsse:Nonce"));
        assert!(h.contains("<wsu:Created>"));
    }

    #[test]
    fn envelope_wraps_body() {
        let e = envelope(None, "<foo/>");
        assert!(e.contains("<soap:Body><foo/></soap:Body>"));
        assert!(!e.contains("soap:Header"));
    }

    #[test]
    fn envelope_includes_security_header_when_given() {
        let sec = "<wsse:Security/>";
        let e = envelope(Some(sec), "<foo/>");
        assert!(e.contains("<soap:Header><wsse:Security/></soap:Header>"));
    }
}
