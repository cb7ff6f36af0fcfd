//! Certificate trust policies.
//!
//! The default is ordinary Web PKI validation against the bundled Mozilla
//! roots. Local bridges and self-hosted servers often present self-signed
//! certificates, so two pinning modes are offered on top: a fixed set of
//! SHA-256 fingerprints, and trust-on-first-use where the first certificate
//! seen for a host is remembered and every later one must match it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{Error, Result};

/// SHA-256 fingerprint of a DER-encoded certificate.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Computes the fingerprint of a DER certificate.
    #[must_use]
    pub fn of(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    /// Parses a hex fingerprint, with or without `:` separators.
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Self> {
        let digits: Vec<u8> = s.bytes().filter(|b| *b != b':').collect();
        if digits.len() != 64 {
            return None;
        }
        let mut out = [0u8; 32];
        for (byte, pair) in out.iter_mut().zip(digits.chunks_exact(2)) {
            let hex = std::str::from_utf8(pair).ok()?;
            *byte = u8::from_str_radix(hex, 16).ok()?;
        }
        Some(Self(out))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// Persistence for trust-on-first-use pins.
pub trait PinStore: Send + Sync {
    /// Returns the pinned fingerprint for `host`, if any.
    fn get(&self, host: &str) -> Option<Fingerprint>;

    /// Records the pin for `host`.
    fn put(&self, host: &str, fingerprint: Fingerprint);
}

/// Process-local pin store.
#[derive(Debug, Default)]
pub struct MemoryPinStore {
    pins: Mutex<HashMap<String, Fingerprint>>,
}

impl MemoryPinStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PinStore for MemoryPinStore {
    fn get(&self, host: &str) -> Option<Fingerprint> {
        self.pins
            .lock()
            .ok()
            .and_then(|pins| pins.get(&host.to_ascii_lowercase()).copied())
    }

    fn put(&self, host: &str, fingerprint: Fingerprint) {
        if let Ok(mut pins) = self.pins.lock() {
            pins.insert(host.to_ascii_lowercase(), fingerprint);
        }
    }
}

/// How the server certificate is validated.
#[derive(Clone, Default)]
pub enum TrustPolicy {
    /// Standard chain validation against the Mozilla root set.
    #[default]
    WebPki,
    /// Accept exactly these end-entity certificates.
    Pinned(Vec<Fingerprint>),
    /// Pin the first certificate seen per host, reject changes afterwards.
    TrustOnFirstUse(Arc<dyn PinStore>),
}

impl fmt::Debug for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebPki => f.write_str("WebPki"),
            Self::Pinned(pins) => f.debug_tuple("Pinned").field(pins).finish(),
            Self::TrustOnFirstUse(_) => f.write_str("TrustOnFirstUse"),
        }
    }
}

/// Builds the rustls client configuration for one connection attempt.
///
/// The returned flag is raised when a TOFU pin mismatch caused the handshake
/// to fail, so the caller can report [`Error::CertificateMismatch`].
pub(crate) fn client_config(
    policy: &TrustPolicy,
    host: &str,
) -> Result<(rustls::ClientConfig, Arc<AtomicBool>)> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let mismatch = Arc::new(AtomicBool::new(false));

    if matches!(policy, TrustPolicy::WebPki) {
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        return Ok((config, mismatch));
    }

    let webpki = WebPkiServerVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| Error::Tls(rustls::Error::General(e.to_string())))?;
    let verifier = PolicyVerifier {
        webpki,
        policy: policy.clone(),
        host: host.to_ascii_lowercase(),
        mismatch: Arc::clone(&mismatch),
    };
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok((config, mismatch))
}

/// Certificate verifier implementing the pinning policies. Handshake
/// signatures are still checked by the Web PKI verifier.
struct PolicyVerifier {
    webpki: Arc<WebPkiServerVerifier>,
    policy: TrustPolicy,
    host: String,
    mismatch: Arc<AtomicBool>,
}

impl fmt::Debug for PolicyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyVerifier")
            .field("policy", &self.policy)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let presented = Fingerprint::of(end_entity.as_ref());
        match &self.policy {
            TrustPolicy::WebPki => self.webpki.verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                ocsp_response,
                now,
            ),
            TrustPolicy::Pinned(pins) => {
                if pins.contains(&presented) {
                    Ok(ServerCertVerified::assertion())
                } else {
                    warn!("Certificate {presented} for {} is not pinned", self.host);
                    Err(rustls::Error::InvalidCertificate(
                        CertificateError::ApplicationVerificationFailure,
                    ))
                }
            }
            TrustPolicy::TrustOnFirstUse(store) => match store.get(&self.host) {
                Some(pinned) if pinned == presented => Ok(ServerCertVerified::assertion()),
                Some(pinned) => {
                    warn!(
                        "Certificate for {} changed: pinned {pinned}, presented {presented}",
                        self.host
                    );
                    self.mismatch.store(true, Ordering::SeqCst);
                    Err(rustls::Error::InvalidCertificate(
                        CertificateError::ApplicationVerificationFailure,
                    ))
                }
                None => {
                    info!("Pinning certificate {presented} for {}", self.host);
                    store.put(&self.host, presented);
                    Ok(ServerCertVerified::assertion())
                }
            },
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.webpki.supported_verify_schemes()
    }
}
