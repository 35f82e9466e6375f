//! Pulling release vectors and role bundles from OCI registries.
//!
//! Only the two requests of a pull are spoken: the image manifest and one
//! layer blob. Layers are selected by media type. Registries that answer
//! `401` with a `Bearer` challenge are handled with the token flow of the
//! distribution spec; the obtained token is reused for the blob request.
//!
//! # Reference Format
//!
//! ```text
//! [oci://]<host[:port]>/<namespace>:<tag>
//! ```
//!
//! The tag is split off at the last colon, so registry ports work. A tag is
//! mandatory: `oci://host:5000/repo` is rejected.

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

use super::archive::{RenameFilter, extract_all, extract_member};
use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::constants::{
    ANSIBLE_ROLE_MEDIA_TYPE, DEFAULT_OCI_SCHEME, OCI_MANIFEST_MEDIA_TYPE, OCI_PREFIX,
    RELEASE_VECTOR_MEDIA_TYPE,
};
use crate::core::VectorError;
use crate::verify::{CosignOptions, SignatureVerifier};

/// A parsed OCI reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    /// URL scheme used to reach the registry
    pub scheme: String,
    /// Registry host with optional port
    pub host: String,
    /// Repository path below the host
    pub namespace: String,
    /// Tag
    pub tag: String,
}

impl OciReference {
    /// Parse a reference, with or without the `oci://` prefix.
    pub fn parse(reference: &str, scheme: &str) -> Result<Self> {
        let invalid = |reason: &str| VectorError::InvalidOciReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let stripped = reference.strip_prefix(OCI_PREFIX).unwrap_or(reference);
        let (name, tag) = stripped
            .rsplit_once(':')
            .filter(|(_, tag)| !tag.is_empty() && !tag.contains('/'))
            .ok_or_else(|| invalid("no tag specified"))?;
        let (host, namespace) = name
            .split_once('/')
            .filter(|(host, namespace)| !host.is_empty() && !namespace.is_empty())
            .ok_or_else(|| invalid("expected <host>/<namespace>:<tag>"))?;

        Ok(Self {
            scheme: if scheme.is_empty() {
                DEFAULT_OCI_SCHEME.to_string()
            } else {
                scheme.to_string()
            },
            host: host.to_string(),
            namespace: namespace.to_string(),
            tag: tag.to_string(),
        })
    }

    /// `<scheme>://<host>`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// URL of the manifest of this tag.
    pub fn manifest_url(&self) -> String {
        format!("{}/v2/{}/manifests/{}", self.base_url(), self.namespace, self.tag)
    }

    /// URL of a blob in this repository.
    pub fn blob_url(&self, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.base_url(), self.namespace, digest)
    }
}

impl fmt::Display for OciReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.host, self.namespace, self.tag)
    }
}

/// Registry access settings of a vector specification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OciOptions {
    /// Registry username
    pub username: Option<String>,
    /// Registry password
    pub password: Option<String>,
    /// URL scheme, `https` when unset
    pub scheme: Option<String>,
    /// Signature verification settings
    pub cosign: CosignOptions,
}

impl OciOptions {
    /// The effective scheme.
    pub fn scheme(&self) -> &str {
        self.scheme.as_deref().unwrap_or(DEFAULT_OCI_SCHEME)
    }

    /// Username and password, only when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    /// Fill unset fields from `parent`.
    #[must_use]
    pub fn inherit(mut self, parent: &Self) -> Self {
        if self.username.is_none() {
            self.username.clone_from(&parent.username);
        }
        if self.password.is_none() {
            self.password.clone_from(&parent.password);
        }
        if self.scheme.is_none() {
            self.scheme.clone_from(&parent.scheme);
        }
        self.cosign = self.cosign.inherit(&parent.cosign);
        self
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    media_type: String,
    digest: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Pulls single layers out of OCI artifacts.
pub struct OciLoader<'a> {
    transport: &'a dyn HttpTransport,
    verifier: &'a SignatureVerifier,
    options: &'a OciOptions,
}

impl<'a> OciLoader<'a> {
    /// Create a loader for one set of registry options.
    pub fn new(
        transport: &'a dyn HttpTransport,
        verifier: &'a SignatureVerifier,
        options: &'a OciOptions,
    ) -> Self {
        Self {
            transport,
            verifier,
            options,
        }
    }

    /// Fetch a release vector artifact and return the document member.
    pub async fn load_release_vector(&self, reference: &str, member: &str) -> Result<String> {
        let reference = OciReference::parse(reference, self.options.scheme())?;
        let blob = self.fetch_layer(&reference, RELEASE_VECTOR_MEDIA_TYPE).await?;
        extract_member(&blob, member, &reference.to_string())
            .with_context(|| format!("Failed to extract {member} from {reference}"))
    }

    /// Fetch a role bundle and extract it below `dest`.
    pub async fn install_bundle(
        &self,
        reference: &str,
        dest: &Path,
        rename: Option<&RenameFilter>,
    ) -> Result<Vec<PathBuf>> {
        let reference = OciReference::parse(reference, self.options.scheme())?;
        let blob = self.fetch_layer(&reference, ANSIBLE_ROLE_MEDIA_TYPE).await?;
        extract_all(&blob, dest, rename, &reference.to_string())
            .with_context(|| format!("Failed to extract {} into {}", reference, dest.display()))
    }

    /// Verify, then download the first layer of `media_type` and check its
    /// digest.
    pub async fn fetch_layer(&self, reference: &OciReference, media_type: &str) -> Result<Vec<u8>> {
        self.verifier
            .verify(reference, &self.options.cosign, self.options.credentials())
            .await
            .with_context(|| format!("Signature verification of {reference} failed"))?;

        let mut token = None;

        let manifest_url = reference.manifest_url();
        tracing::debug!(target: "oci", "Fetching manifest {}", manifest_url);
        let response = self
            .get_authorized(&manifest_url, Some(OCI_MANIFEST_MEDIA_TYPE), &mut token)
            .await
            .with_context(|| format!("Failed to fetch manifest of {reference}"))?;
        let manifest: Manifest = serde_json::from_slice(&response.body).map_err(|e| {
            VectorError::DocumentParseError {
                url: manifest_url.clone(),
                reason: e.to_string(),
            }
        })?;

        let layer = manifest
            .layers
            .iter()
            .find(|layer| layer.media_type == media_type)
            .ok_or_else(|| VectorError::OciLayerNotFound {
                reference: reference.to_string(),
                media_type: media_type.to_string(),
            })?;

        let blob_url = reference.blob_url(&layer.digest);
        tracing::debug!(target: "oci", "Fetching blob {}", blob_url);
        let response = self
            .get_authorized(&blob_url, None, &mut token)
            .await
            .with_context(|| format!("Failed to fetch blob {} of {}", layer.digest, reference))?;

        verify_digest(&response.body, &layer.digest, reference)?;
        Ok(response.body)
    }

    // GET with basic auth or a bearer token; a Bearer challenge is answered
    // once and the token kept for later requests.
    async fn get_authorized(
        &self,
        url: &str,
        accept: Option<&str>,
        token: &mut Option<String>,
    ) -> Result<HttpResponse> {
        let credentials = self
            .options
            .credentials()
            .map(|(user, pass)| (user.to_string(), pass.to_string()));

        let build = |token: Option<String>| {
            let mut request = HttpRequest::get(url).basic_auth(credentials.clone()).bearer(token);
            if let Some(accept) = accept {
                request = request.header("Accept", accept);
            }
            request
        };

        let mut response = self.transport.get(build(token.clone())).await?;

        if response.status == 401 && token.is_none() {
            if let Some(challenge) =
                response.header("www-authenticate").and_then(BearerChallenge::parse)
            {
                *token = Some(self.fetch_token(&challenge).await?);
                response = self.transport.get(build(token.clone())).await?;
            }
        }

        if !response.is_success() {
            return Err(VectorError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            }
            .into());
        }
        Ok(response)
    }

    async fn fetch_token(&self, challenge: &BearerChallenge) -> Result<String> {
        let mut params = Vec::new();
        if let Some(service) = &challenge.service {
            params.push(("service", service.as_str()));
        }
        if let Some(scope) = &challenge.scope {
            params.push(("scope", scope.as_str()));
        }
        let url = reqwest::Url::parse_with_params(&challenge.realm, &params).map_err(|e| {
            VectorError::NetworkError {
                operation: format!("token request to {}", challenge.realm),
                reason: e.to_string(),
            }
        })?;

        tracing::debug!(target: "oci", "Requesting bearer token from {}", challenge.realm);
        let credentials = self
            .options
            .credentials()
            .map(|(user, pass)| (user.to_string(), pass.to_string()));
        let response = self
            .transport
            .get(HttpRequest::get(url.as_str()).basic_auth(credentials))
            .await
            .context("Failed to request registry token")?;
        if !response.is_success() {
            return Err(VectorError::HttpStatus {
                url: challenge.realm.clone(),
                status: response.status,
            }
            .into());
        }

        let body: TokenResponse = serde_json::from_slice(&response.body).map_err(|e| {
            VectorError::DocumentParseError {
                url: challenge.realm.clone(),
                reason: e.to_string(),
            }
        })?;
        body.token.or(body.access_token).ok_or_else(|| {
            VectorError::NetworkError {
                operation: format!("token request to {}", challenge.realm),
                reason: "response contains no token".to_string(),
            }
            .into()
        })
    }
}

fn verify_digest(body: &[u8], digest: &str, reference: &OciReference) -> Result<()> {
    let expected = digest.strip_prefix("sha256:").ok_or_else(|| VectorError::ArchiveError {
        reference: reference.to_string(),
        reason: format!("unsupported digest algorithm in {digest}"),
    })?;
    let actual = hex::encode(Sha256::digest(body));
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(VectorError::ChecksumMismatch {
            reference: reference.to_string(),
            expected: digest.to_string(),
            actual: format!("sha256:{actual}"),
        }
        .into());
    }
    Ok(())
}

/// Parameters of a `WWW-Authenticate: Bearer ...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    /// Token endpoint
    pub realm: String,
    /// `service` parameter
    pub service: Option<String>,
    /// `scope` parameter
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// Parse a challenge; `None` for other schemes or without a realm.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in parse_auth_params(params) {
            match key.to_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }
}

// key=value pairs separated by commas; values may be quoted and contain commas
fn parse_auth_params(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.peek().copied() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }

    pairs
}
