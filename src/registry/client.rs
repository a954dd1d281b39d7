//! OCI distribution API client.
//!
//! This module speaks just enough of the distribution protocol to read image
//! metadata and copy images between repositories:
//! - Manifest and index fetch with digest verification
//! - Config blob decoding for image labels
//! - Blob existence checks, monolithic uploads and manifest pushes
//! - Bearer token and basic authentication

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{header, Client, Method, Response, StatusCode, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{KpError, RegistryError, Result};

use super::auth::{Challenge, Credential, CredentialStore, TokenResponse};
use super::reference::ImageReference;
use super::{ImageInfo, Registry};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 500;

const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// TLS settings for registry connections.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// Extra PEM certificate authority to trust.
    pub ca_cert_path: Option<PathBuf>,
    /// Whether server certificates are verified.
    pub verify_certs: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            ca_cert_path: None,
            verify_certs: true,
        }
    }
}

/// A manifest or index as stored in the registry.
#[derive(Debug, Clone)]
struct RawManifest {
    bytes: Vec<u8>,
    media_type: String,
    digest: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    config: Option<BlobDescriptor>,
    #[serde(default)]
    layers: Vec<BlobDescriptor>,
    #[serde(default)]
    manifests: Vec<ManifestDescriptor>,
}

#[derive(Debug, Deserialize)]
struct BlobDescriptor {
    digest: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDescriptor {
    digest: String,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    platform: Option<Platform>,
}

#[derive(Debug, Deserialize)]
struct Platform {
    #[serde(default)]
    os: String,
    #[serde(default)]
    architecture: String,
}

#[derive(Debug, Deserialize)]
struct ImageConfigFile {
    #[serde(default)]
    config: Option<ImageConfigBody>,
}

#[derive(Debug, Deserialize)]
struct ImageConfigBody {
    #[serde(default, rename = "Labels")]
    labels: Option<BTreeMap<String, String>>,
}

impl ManifestDocument {
    fn is_index(&self) -> bool {
        !self.manifests.is_empty()
    }
}

/// Registry client over HTTP.
#[derive(Debug)]
pub struct RegistryClient {
    /// HTTP client.
    client: Client,
    /// Credentials by registry host.
    credentials: CredentialStore,
    /// Bearer tokens by registry and scope.
    tokens: Mutex<HashMap<String, String>>,
}

impl RegistryClient {
    /// Creates a client with the given TLS settings and credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the CA certificate cannot be loaded or the HTTP
    /// client cannot be built.
    pub fn new(tls: &TlsOptions, credentials: CredentialStore) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!tls.verify_certs);

        if let Some(path) = &tls.ca_cert_path {
            let pem = std::fs::read(path).map_err(|e| RegistryError::Tls {
                message: format!("failed to read {}: {e}", path.display()),
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| RegistryError::Tls {
                message: format!("invalid certificate {}: {e}", path.display()),
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(|e| RegistryError::Tls {
            message: format!("failed to create HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            credentials,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a client with default TLS settings and no credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn anonymous() -> Result<Self> {
        Self::new(&TlsOptions::default(), CredentialStore::default())
    }

    fn url(reference: &ImageReference, tail: &str) -> String {
        format!(
            "{}/v2/{}/{tail}",
            reference.registry_url(),
            reference.repository
        )
    }

    /// Sends a request, retrying transient network failures.
    async fn send(
        &self,
        method: Method,
        url: &str,
        reference: &ImageReference,
        push: bool,
        headers: &[(header::HeaderName, String)],
        body: Option<&[u8]>,
    ) -> Result<Response> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for {url}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            match self
                .send_authenticated(method.clone(), url, reference, push, headers, body)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RegistryError::network(&reference.registry, "max retries exceeded").into()
        }))
    }

    async fn send_authenticated(
        &self,
        method: Method,
        url: &str,
        reference: &ImageReference,
        push: bool,
        headers: &[(header::HeaderName, String)],
        body: Option<&[u8]>,
    ) -> Result<Response> {
        let scope = Self::scope(reference, push);
        let cached = self.cached_token(&reference.registry, &scope);

        let response = self
            .send_once(method.clone(), url, reference, headers, body, cached.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(Challenge::parse);

        let authorization = match challenge {
            Some(Challenge::Bearer {
                realm,
                service,
                scope: _,
            }) => {
                let token = self
                    .fetch_token(reference, &realm, service.as_deref(), &scope)
                    .await?;
                format!("Bearer {token}")
            }
            Some(Challenge::Basic) => match self.credentials.credential_for(&reference.registry) {
                Credential::Basic { username, password } => {
                    format!("Basic {}", basic_auth(&username, &password))
                }
                Credential::Anonymous => return Err(Self::unauthorized(reference, url)),
            },
            None => return Err(Self::unauthorized(reference, url)),
        };

        let response = self
            .send_once(method, url, reference, headers, body, Some(&authorization))
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            return Err(Self::unauthorized(reference, url));
        }

        Ok(response)
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        reference: &ImageReference,
        headers: &[(header::HeaderName, String)],
        body: Option<&[u8]>,
        authorization: Option<&str>,
    ) -> Result<Response> {
        trace!("{method} {url}");

        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(name.clone(), value.as_str());
        }
        if let Some(authorization) = authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }
        if let Some(body) = body {
            request = request.body(body.to_vec());
        }

        request
            .send()
            .await
            .map_err(|e| RegistryError::network(&reference.registry, e.to_string()).into())
    }

    fn scope(reference: &ImageReference, push: bool) -> String {
        let actions = if push { "pull,push" } else { "pull" };
        format!("repository:{}:{actions}", reference.repository)
    }

    fn cached_token(&self, registry: &str, scope: &str) -> Option<String> {
        let tokens = self
            .tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tokens
            .get(&format!("{registry} {scope}"))
            .map(|token| format!("Bearer {token}"))
    }

    async fn fetch_token(
        &self,
        reference: &ImageReference,
        realm: &str,
        service: Option<&str>,
        scope: &str,
    ) -> Result<String> {
        let mut params = vec![("scope", scope)];
        if let Some(service) = service {
            params.push(("service", service));
        }

        let url = Url::parse_with_params(realm, &params).map_err(|e| RegistryError::Unauthorized {
            registry: reference.registry.clone(),
            message: format!("invalid token realm '{realm}': {e}"),
        })?;

        debug!("Requesting registry token from {realm} for {scope}");

        let mut request = self.client.get(url);
        if let Credential::Basic { username, password } =
            self.credentials.credential_for(&reference.registry)
        {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::network(&reference.registry, e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::Unauthorized {
                registry: reference.registry.clone(),
                message: format!("token request returned {}", response.status()),
            }
            .into());
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .ok()
            .and_then(TokenResponse::into_token)
            .ok_or_else(|| RegistryError::Unauthorized {
                registry: reference.registry.clone(),
                message: String::from("token response carried no token"),
            })?;

        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(format!("{} {scope}", reference.registry), token.clone());

        Ok(token)
    }

    fn unauthorized(reference: &ImageReference, url: &str) -> KpError {
        RegistryError::Unauthorized {
            registry: reference.registry.clone(),
            message: format!("access to {url} was denied"),
        }
        .into()
    }

    async fn check_status(response: Response, url: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(RegistryError::Status {
            url: url.to_string(),
            status,
            message,
        }
        .into())
    }

    async fn get_manifest(&self, reference: &ImageReference, identifier: &str) -> Result<RawManifest> {
        let url = Self::url(reference, &format!("manifests/{identifier}"));
        let accept = [OCI_MANIFEST, OCI_INDEX, DOCKER_MANIFEST, DOCKER_MANIFEST_LIST].join(", ");

        let response = self
            .send(Method::GET, &url, reference, false, &[(header::ACCEPT, accept)], None)
            .await?;
        let response = Self::check_status(response, &url).await?;

        let media_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let header_digest = response
            .headers()
            .get("docker-content-digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RegistryError::network(&reference.registry, e.to_string()))?
            .to_vec();

        let digest = sha256_digest(&bytes);
        let expected = if identifier.contains(':') {
            Some(identifier.to_string())
        } else {
            header_digest
        };
        if let Some(expected) = expected {
            if expected != digest {
                return Err(RegistryError::DigestMismatch {
                    reference: reference.to_string(),
                    expected,
                    actual: digest,
                }
                .into());
            }
        }

        let media_type = match media_type {
            Some(media_type) if !media_type.is_empty() => media_type,
            _ => Self::parse_manifest(reference, &bytes)?
                .media_type
                .unwrap_or_else(|| OCI_MANIFEST.to_string()),
        };

        Ok(RawManifest {
            bytes,
            media_type,
            digest,
        })
    }

    fn parse_manifest(reference: &ImageReference, bytes: &[u8]) -> Result<ManifestDocument> {
        serde_json::from_slice(bytes)
            .map_err(|e| RegistryError::manifest(reference.to_string(), e.to_string()).into())
    }

    async fn get_blob(&self, reference: &ImageReference, digest: &str) -> Result<Vec<u8>> {
        let url = Self::url(reference, &format!("blobs/{digest}"));
        let response = self
            .send(Method::GET, &url, reference, false, &[], None)
            .await?;
        let response = Self::check_status(response, &url).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RegistryError::network(&reference.registry, e.to_string()))?
            .to_vec();

        let actual = sha256_digest(&bytes);
        if actual != digest {
            return Err(RegistryError::DigestMismatch {
                reference: format!("{}@{digest}", reference.context()),
                expected: digest.to_string(),
                actual,
            }
            .into());
        }

        Ok(bytes)
    }

    async fn blob_exists(&self, reference: &ImageReference, digest: &str) -> Result<bool> {
        let url = Self::url(reference, &format!("blobs/{digest}"));
        let response = self
            .send(Method::HEAD, &url, reference, true, &[], None)
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Self::check_status(response, &url).await.map(|_| false),
        }
    }

    async fn upload_blob(&self, reference: &ImageReference, digest: &str, bytes: &[u8]) -> Result<()> {
        let url = Self::url(reference, "blobs/uploads/");
        let response = self
            .send(Method::POST, &url, reference, true, &[], None)
            .await?;
        let response = Self::check_status(response, &url).await?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RegistryError::Status {
                url: url.clone(),
                status: response.status().as_u16(),
                message: String::from("upload response carried no Location header"),
            })?;

        let location = if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}{location}", reference.registry_url())
        };
        let separator = if location.contains('?') { '&' } else { '?' };
        let put_url = format!("{location}{separator}digest={digest}");

        let response = self
            .send(
                Method::PUT,
                &put_url,
                reference,
                true,
                &[(header::CONTENT_TYPE, String::from("application/octet-stream"))],
                Some(bytes),
            )
            .await?;
        Self::check_status(response, &put_url).await?;

        debug!("Uploaded blob {digest} to {}", reference.context());
        Ok(())
    }

    async fn put_manifest(&self, reference: &ImageReference, manifest: &RawManifest) -> Result<()> {
        let url = Self::url(reference, &format!("manifests/{}", manifest.digest));
        let response = self
            .send(
                Method::PUT,
                &url,
                reference,
                true,
                &[(header::CONTENT_TYPE, manifest.media_type.clone())],
                Some(&manifest.bytes),
            )
            .await?;
        Self::check_status(response, &url).await?;
        Ok(())
    }

    /// Copies one image manifest and the blobs it references.
    async fn copy_image(
        &self,
        source: &ImageReference,
        destination: &ImageReference,
        manifest: &RawManifest,
    ) -> Result<()> {
        let document = Self::parse_manifest(source, &manifest.bytes)?;

        let blobs = document
            .config
            .iter()
            .chain(document.layers.iter())
            .map(|d| d.digest.as_str());

        for digest in blobs {
            if self.blob_exists(destination, digest).await? {
                trace!("Blob {digest} already present in {}", destination.context());
                continue;
            }
            let bytes = self.get_blob(source, digest).await?;
            self.upload_blob(destination, digest, &bytes).await?;
        }

        self.put_manifest(destination, manifest).await
    }

    /// Picks the image an index resolves to for label lookups.
    fn select_platform(document: &ManifestDocument) -> Option<&ManifestDescriptor> {
        document
            .manifests
            .iter()
            .find(|m| {
                m.platform
                    .as_ref()
                    .is_some_and(|p| p.os == "linux" && p.architecture == "amd64")
            })
            .or_else(|| document.manifests.first())
    }

    async fn read_labels(
        &self,
        reference: &ImageReference,
        document: &ManifestDocument,
    ) -> Result<BTreeMap<String, String>> {
        let Some(config) = &document.config else {
            return Ok(BTreeMap::new());
        };

        let bytes = self.get_blob(reference, &config.digest).await?;
        let file: ImageConfigFile = serde_json::from_slice(&bytes)
            .map_err(|e| RegistryError::manifest(reference.to_string(), e.to_string()))?;

        Ok(file
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn fetch(&self, image: &str) -> Result<ImageInfo> {
        let reference = ImageReference::parse(image)?;
        let top = self.get_manifest(&reference, reference.identifier()).await?;
        let document = Self::parse_manifest(&reference, &top.bytes)?;

        let labels = if document.is_index() {
            let Some(child) = Self::select_platform(&document) else {
                return Err(RegistryError::manifest(image, "index lists no manifests").into());
            };
            let child = self.get_manifest(&reference, &child.digest).await?;
            let child_document = Self::parse_manifest(&reference, &child.bytes)?;
            self.read_labels(&reference, &child_document).await?
        } else {
            self.read_labels(&reference, &document).await?
        };

        debug!("Fetched {image} at {}", top.digest);
        Ok(ImageInfo {
            digest: top.digest,
            labels,
        })
    }

    async fn digest(&self, image: &str) -> Result<String> {
        let reference = ImageReference::parse(image)?;
        let top = self.get_manifest(&reference, reference.identifier()).await?;
        debug!("Resolved {image} to {}", top.digest);
        Ok(top.digest)
    }

    async fn relocate(&self, image: &str, destination: &str) -> Result<String> {
        let source = ImageReference::parse(image)?;
        let target = ImageReference::parse(destination)?;

        let top = self.get_manifest(&source, source.identifier()).await?;
        let document = Self::parse_manifest(&source, &top.bytes)?;

        if document.is_index() {
            for child in &document.manifests {
                trace!(
                    "Copying index child {} ({})",
                    child.digest,
                    child.media_type.as_deref().unwrap_or("unknown")
                );
                let manifest = self.get_manifest(&source, &child.digest).await?;
                self.copy_image(&source, &target, &manifest).await?;
            }
            self.put_manifest(&target, &top).await?;
        } else {
            self.copy_image(&source, &target, &top).await?;
        }

        let relocated = relocated_reference(destination, &top.digest);
        debug!("Relocated {image} to {relocated}");
        Ok(relocated)
    }
}

/// Qualifies `destination` with a digest, keeping it as written.
///
/// Docker Hub shorthand is not expanded, so the result compares equal to the
/// targets planned from the same canonical repository.
fn relocated_reference(destination: &str, digest: &str) -> String {
    format!("{destination}@{digest}")
}

/// Returns the `sha256:<hex>` digest of some bytes.
#[must_use]
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

fn basic_auth(username: &str, password: &str) -> String {
    STANDARD.encode(format!("{username}:{password}"))
}
