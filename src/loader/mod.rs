//! Fetching release vector documents.
//!
//! [`ContentLoader`] is the single entry point used by the resolver. It
//! routes `oci://` references to [`oci::OciLoader`] and everything else to
//! [`url::UrlLoader`], then parses the text into a [`Document`].
//!
//! # Modules
//!
//! - [`transport`] - the HTTP seam and its `reqwest` implementation
//! - [`url`] - single GET (or local file) loading
//! - [`oci`] - two-step OCI pulls with optional bearer token flow
//! - [`archive`] - tar+gzip extraction

pub mod archive;
pub mod oci;
pub mod transport;
pub mod url;

pub use archive::RenameFilter;
pub use oci::{OciLoader, OciOptions, OciReference};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use url::UrlLoader;

use anyhow::{Context, Result};

use crate::constants::OCI_PREFIX;
use crate::document::Document;
use crate::verify::SignatureVerifier;

/// Loads documents from URLs and OCI references.
pub struct ContentLoader<'a> {
    transport: &'a dyn HttpTransport,
    verifier: &'a SignatureVerifier,
}

impl<'a> ContentLoader<'a> {
    /// Create a loader.
    pub fn new(transport: &'a dyn HttpTransport, verifier: &'a SignatureVerifier) -> Self {
        Self {
            transport,
            verifier,
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &'a dyn HttpTransport {
        self.transport
    }

    /// The signature verifier used for OCI artifacts.
    pub fn verifier(&self) -> &'a SignatureVerifier {
        self.verifier
    }

    /// Load and parse the document at `reference`.
    ///
    /// `options` and `member` only apply to OCI references.
    pub async fn load(&self, reference: &str, options: &OciOptions, member: &str) -> Result<Document> {
        tracing::info!("Loading remote content from {}", reference);

        let text = if reference.starts_with(OCI_PREFIX) {
            OciLoader::new(self.transport, self.verifier, options)
                .load_release_vector(reference, member)
                .await?
        } else {
            UrlLoader::new(self.transport).fetch_text(reference).await?
        };

        Document::parse(&text, reference)
            .with_context(|| format!("Failed to load release vector {reference}"))
    }
}
