//! The SOAP partner `login` call.

use cumulus_core::CumulusError;
use quick_xml::escape::escape;
use serde::Deserialize;

pub(crate) fn login_envelope(username: &str, password: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<env:Envelope xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:env="http://schemas.xmlsoap.org/soap/envelope/">
  <env:Body>
    <n1:login xmlns:n1="urn:partner.soap.sforce.com">
      <n1:username>{}</n1:username>
      <n1:password>{}</n1:password>
    </n1:login>
  </env:Body>
</env:Envelope>"#,
        escape(username),
        escape(password)
    )
}

// Element names arrive with whatever prefix the server picked.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "soapenv:Body", alias = "Body", alias = "env:Body", alias = "soap:Body")]
    body: Body,
}

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(rename = "loginResponse", default)]
    login_response: Option<LoginResponse>,
    #[serde(
        rename = "soapenv:Fault",
        alias = "Fault",
        alias = "env:Fault",
        alias = "soap:Fault",
        default
    )]
    fault: Option<Fault>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    result: LoginResult,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    #[serde(rename = "serverUrl")]
    server_url: String,
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct Fault {
    faultcode: Option<String>,
    faultstring: Option<String>,
}

/// Session established by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Session {
    pub(crate) session_id: String,
    pub(crate) server_url: String,
}

pub(crate) fn parse_login_response(xml: &str) -> Result<Session, CumulusError> {
    let envelope: Envelope = quick_xml::de::from_str(xml)
        .map_err(|e| CumulusError::Salesforce(format!("invalid login response: {e}")))?;

    if let Some(fault) = envelope.body.fault {
        let code = fault.faultcode.unwrap_or_default();
        let message = fault.faultstring.unwrap_or_default();
        return Err(CumulusError::Salesforce(format!("login failed: {code}: {message}")));
    }

    let result = envelope
        .body
        .login_response
        .ok_or_else(|| CumulusError::Salesforce("login response has no result".into()))?
        .result;
    Ok(Session {
        session_id: result.session_id,
        server_url: result.server_url,
    })
}
