//! Certificate authority bootstrap, leaf issuance, and rotation
//!
//! The operator maintains two independent self-signed authorities (server
//! side and client side of hub-member traffic) and three leaf certificates
//! signed by them: the hub API server leaf, the dashboard proxy client
//! leaf, and the member agent leaf that the bundle builder embeds into
//! every work bundle.
//!
//! Every certificate lives in a hub-namespace secret with exactly three
//! fields: `ca.crt` (trust bundle), `tls.crt` (certificate), `tls.key`
//! (private key), all PEM. Rotation preserves the existing private key
//! whenever it still parses; an unusable stored key forces fresh key
//! generation and is a recovery path, never a fatal error.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::core::ObjectMeta;
use rand::RngCore;
use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use tracing::{debug, info, warn};

use crate::controller::store::SecretStore;
use crate::crd::ObservabilityFleet;
use crate::{api_service_host, Error};

/// Secret holding the server-side authority
pub const SERVER_CA_SECRET: &str = "observability-server-ca-certs";
const SERVER_CA_CN: &str = "observability-server-ca-certificate";

/// Secret holding the client-side authority
pub const CLIENT_CA_SECRET: &str = "observability-client-ca-certs";
const CLIENT_CA_CN: &str = "observability-client-ca-certificate";

/// Secret holding the hub API server leaf
pub const SERVER_CERT_SECRET: &str = "observability-server-certs";
const SERVER_CERT_CN: &str = "observability-server-certificate";

/// Secret holding the dashboard proxy client leaf
pub const PROXY_CERT_SECRET: &str = "observability-proxy-certs";
const PROXY_CERT_CN: &str = "observability-proxy";

/// Secret holding the member agent leaf embedded into work bundles
pub const MEMBER_CERT_SECRET: &str = "observability-managed-cluster-certs";
const MEMBER_CERT_CN: &str = "observability-managed-cluster";

/// Trust-bundle field of a certificate secret
pub const CA_CRT: &str = "ca.crt";
/// Certificate field of a certificate secret
pub const TLS_CRT: &str = "tls.crt";
/// Private-key field of a certificate secret
pub const TLS_KEY: &str = "tls.key";

const CA_VALIDITY_YEARS: i64 = 5;
const LEAF_VALIDITY_YEARS: i64 = 1;

/// Serial numbers are 128-bit cryptographically random values
const SERIAL_BYTES: usize = 16;

/// A freshly generated certificate and its private key, both PEM
struct CertifiedKey {
    cert_pem: String,
    key_pem: String,
}

/// Parameters for one named leaf certificate
pub struct LeafRequest {
    /// Secret the leaf is stored under
    pub name: &'static str,
    /// Whether the server authority signs this leaf (client authority otherwise)
    pub server_role: bool,
    /// Subject common name
    pub common_name: &'static str,
    /// Subject organizational units
    pub org_units: Vec<String>,
    /// DNS subject alternative names; the common name is always forced into
    /// the first position
    pub dns_names: Vec<String>,
    /// IP subject alternative names, taken verbatim
    pub ip_addresses: Vec<IpAddr>,
}

/// Ensure both authorities and all three leaves exist.
///
/// Invoked at the start of every convergence pass; existing secrets are
/// left untouched, so the steady-state cost is five reads.
pub async fn ensure_certificates(
    store: &dyn SecretStore,
    hub_namespace: &str,
    fleet: &ObservabilityFleet,
) -> Result<(), Error> {
    ensure_authority(store, hub_namespace, SERVER_CA_SECRET, SERVER_CA_CN).await?;
    ensure_authority(store, hub_namespace, CLIENT_CA_SECRET, CLIENT_CA_CN).await?;

    let advertised = fleet.spec.advertised_address.as_deref();
    for request in leaf_requests(hub_namespace, advertised) {
        ensure_leaf(store, hub_namespace, &request).await?;
    }
    Ok(())
}

/// Rotate both authorities, then every leaf.
///
/// Authorities rotate first so the re-signed leaves chain to the new trust
/// bundles; rotating in the other order would leave leaves verifiable only
/// against retired authorities.
pub async fn rotate_certificates(
    store: &dyn SecretStore,
    hub_namespace: &str,
    advertised_address: Option<&str>,
) -> Result<(), Error> {
    rotate_authority(store, SERVER_CA_SECRET, SERVER_CA_CN).await?;
    rotate_authority(store, CLIENT_CA_SECRET, CLIENT_CA_CN).await?;

    for request in leaf_requests(hub_namespace, advertised_address) {
        rotate_leaf(store, &request).await?;
    }
    Ok(())
}

/// The three named leaves of this deployment
fn leaf_requests(hub_namespace: &str, advertised_address: Option<&str>) -> Vec<LeafRequest> {
    let mut server_sans = vec![api_service_host(hub_namespace)];
    if let Some(address) = advertised_address {
        server_sans.push(address.to_string());
    } else {
        debug!("no advertised address configured, server leaf carries the service SAN only");
    }

    vec![
        LeafRequest {
            name: SERVER_CERT_SECRET,
            server_role: true,
            common_name: SERVER_CERT_CN,
            org_units: Vec::new(),
            dns_names: server_sans,
            ip_addresses: Vec::new(),
        },
        LeafRequest {
            name: PROXY_CERT_SECRET,
            server_role: false,
            common_name: PROXY_CERT_CN,
            org_units: Vec::new(),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
        },
        LeafRequest {
            name: MEMBER_CERT_SECRET,
            server_role: false,
            common_name: MEMBER_CERT_CN,
            org_units: Vec::new(),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
        },
    ]
}

/// Create an authority secret if none exists; an existing one is left
/// untouched until rotation is explicitly requested
pub async fn ensure_authority(
    store: &dyn SecretStore,
    hub_namespace: &str,
    name: &str,
    common_name: &str,
) -> Result<(), Error> {
    if store.get_secret(name).await?.is_some() {
        debug!(name, "authority secret already exists");
        return Ok(());
    }

    let certified = generate_authority(common_name, None)?;
    let secret = authority_secret(hub_namespace, name, &certified);
    store.create_secret(&secret).await?;
    info!(name, "created authority certificate");
    Ok(())
}

/// Re-sign an authority, preserving its private key when it still parses.
///
/// Overwrites all three stored fields in a single update.
pub async fn rotate_authority(
    store: &dyn SecretStore,
    name: &str,
    common_name: &str,
) -> Result<(), Error> {
    info!(name, "rotating authority certificate");
    let Some(mut secret) = store.get_secret(name).await? else {
        info!(name, "authority secret not found, skipping rotation");
        return Ok(());
    };

    let existing_key = decode_stored_key(&secret, name);
    let certified = generate_authority(common_name, existing_key)?;
    secret.data = Some(authority_fields(&certified));
    store.update_secret(&secret).await?;
    info!(name, "authority certificate rotated");
    Ok(())
}

/// Create a leaf secret if none exists, signed by the authority selected by
/// the request's role flag. The issuing authority must be resolvable:
/// its absence is a hard failure, not a soft skip.
pub async fn ensure_leaf(
    store: &dyn SecretStore,
    hub_namespace: &str,
    request: &LeafRequest,
) -> Result<(), Error> {
    if store.get_secret(request.name).await?.is_some() {
        debug!(name = request.name, "leaf secret already exists");
        return Ok(());
    }

    let authority = load_authority(store, request.server_role).await?;
    let ca_cert_pem = secret_field_str(&authority, TLS_CRT)?;
    let ca_key_pem = secret_field_str(&authority, TLS_KEY)?;

    let certified = generate_leaf(&ca_cert_pem, &ca_key_pem, request, None)?;
    let secret = leaf_secret(hub_namespace, request.name, &ca_cert_pem, &certified);
    store.create_secret(&secret).await?;
    info!(name = request.name, "issued leaf certificate");
    Ok(())
}

/// Re-sign a leaf against the current authority, preserving its private key
/// when it still parses. Overwrites all three stored fields in a single
/// update. Callers must rotate authorities before dependent leaves.
pub async fn rotate_leaf(store: &dyn SecretStore, request: &LeafRequest) -> Result<(), Error> {
    info!(name = request.name, "rotating leaf certificate");
    let Some(mut secret) = store.get_secret(request.name).await? else {
        info!(name = request.name, "leaf secret not found, skipping rotation");
        return Ok(());
    };

    let authority = load_authority(store, request.server_role).await?;
    let ca_cert_pem = secret_field_str(&authority, TLS_CRT)?;
    let ca_key_pem = secret_field_str(&authority, TLS_KEY)?;

    let existing_key = decode_stored_key(&secret, request.name);
    let certified = generate_leaf(&ca_cert_pem, &ca_key_pem, request, existing_key)?;
    secret.data = Some(leaf_fields(&ca_cert_pem, &certified));
    store.update_secret(&secret).await?;
    info!(name = request.name, "leaf certificate rotated");
    Ok(())
}

/// Fetch the authority secret for the given role; absence is a hard failure
async fn load_authority(store: &dyn SecretStore, server_role: bool) -> Result<Secret, Error> {
    let name = if server_role {
        SERVER_CA_SECRET
    } else {
        CLIENT_CA_SECRET
    };
    store
        .get_secret(name)
        .await?
        .ok_or_else(|| Error::pki(format!("authority secret {name} not found")))
}

/// Force the common name into the first SAN position without duplicating it
/// when a caller-supplied list already contains it somewhere else
pub fn normalize_dns_names(common_name: &str, dns_names: &[String]) -> Vec<String> {
    let mut names = vec![common_name.to_string()];
    for name in dns_names {
        if name != common_name {
            names.push(name.clone());
        }
    }
    names
}

fn generate_authority(
    common_name: &str,
    existing_key: Option<KeyPair>,
) -> Result<CertifiedKey, Error> {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(common_name, &[]);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
    ];
    params.serial_number = Some(random_serial());
    let (not_before, not_after) = validity_window(CA_VALIDITY_YEARS);
    params.not_before = not_before;
    params.not_after = not_after;

    let key = match existing_key {
        Some(key) => key,
        None => KeyPair::generate()
            .map_err(|e| Error::pki(format!("failed to generate authority key: {e}")))?,
    };

    let cert = params
        .self_signed(&key)
        .map_err(|e| Error::pki(format!("failed to self-sign authority {common_name}: {e}")))?;

    Ok(CertifiedKey {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    })
}

fn generate_leaf(
    ca_cert_pem: &str,
    ca_key_pem: &str,
    request: &LeafRequest,
    existing_key: Option<KeyPair>,
) -> Result<CertifiedKey, Error> {
    let ca_key = KeyPair::from_pem(ca_key_pem)
        .map_err(|e| Error::pki(format!("failed to parse authority key: {e}")))?;
    let issuer = Issuer::from_ca_cert_pem(ca_cert_pem, &ca_key)
        .map_err(|e| Error::pki(format!("failed to load issuing authority: {e}")))?;

    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(request.common_name, &request.org_units);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = if request.server_role {
        vec![ExtendedKeyUsagePurpose::ServerAuth]
    } else {
        vec![ExtendedKeyUsagePurpose::ClientAuth]
    };
    params.serial_number = Some(random_serial());
    let (not_before, not_after) = validity_window(LEAF_VALIDITY_YEARS);
    params.not_before = not_before;
    params.not_after = not_after;

    let mut sans = Vec::new();
    for dns in normalize_dns_names(request.common_name, &request.dns_names) {
        let name = Ia5String::try_from(dns.clone())
            .map_err(|e| Error::pki(format!("invalid DNS name {dns}: {e}")))?;
        sans.push(SanType::DnsName(name));
    }
    for ip in &request.ip_addresses {
        sans.push(SanType::IpAddress(*ip));
    }
    params.subject_alt_names = sans;

    let key = match existing_key {
        Some(key) => key,
        None => KeyPair::generate()
            .map_err(|e| Error::pki(format!("failed to generate leaf key: {e}")))?,
    };

    let cert = params.signed_by(&key, &issuer).map_err(|e| {
        Error::pki(format!(
            "failed to sign leaf {}: {e}",
            request.common_name
        ))
    })?;

    Ok(CertifiedKey {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    })
}

fn distinguished_name(common_name: &str, org_units: &[String]) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String("Spyglass".to_string()),
    );
    for unit in org_units {
        dn.push(
            DnType::OrganizationalUnitName,
            DnValue::Utf8String(unit.clone()),
        );
    }
    dn
}

fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; SERIAL_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    // Clear the top bit so the DER integer stays positive
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}

fn validity_window(years: i64) -> (time::OffsetDateTime, time::OffsetDateTime) {
    let not_before = Utc::now();
    let not_after = not_before + chrono::Duration::days(years * 365);
    (
        time::OffsetDateTime::from_unix_timestamp(not_before.timestamp())
            .unwrap_or(time::OffsetDateTime::now_utc()),
        time::OffsetDateTime::from_unix_timestamp(not_after.timestamp())
            .unwrap_or(time::OffsetDateTime::now_utc()),
    )
}

/// Decode the stored private key, or `None` when it is unusable and a fresh
/// key must be generated. The recovery path is logged, never propagated.
fn decode_stored_key(secret: &Secret, name: &str) -> Option<KeyPair> {
    let data = secret.data.as_ref()?.get(TLS_KEY)?;
    let pem = std::str::from_utf8(&data.0).ok()?;
    match KeyPair::from_pem(pem) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!(name, error = %e, "stored private key is unusable, generating a new one");
            None
        }
    }
}

fn secret_field_str(secret: &Secret, field: &str) -> Result<String, Error> {
    let name = secret.metadata.name.as_deref().unwrap_or_default();
    let data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(field))
        .ok_or_else(|| Error::pki(format!("secret {name} is missing field {field}")))?;
    String::from_utf8(data.0.clone())
        .map_err(|_| Error::pki(format!("secret {name} field {field} is not valid UTF-8")))
}

fn authority_fields(certified: &CertifiedKey) -> BTreeMap<String, ByteString> {
    // The self-signed certificate doubles as its own trust bundle
    BTreeMap::from([
        (CA_CRT.to_string(), ByteString(certified.cert_pem.clone().into_bytes())),
        (TLS_CRT.to_string(), ByteString(certified.cert_pem.clone().into_bytes())),
        (TLS_KEY.to_string(), ByteString(certified.key_pem.clone().into_bytes())),
    ])
}

fn leaf_fields(ca_cert_pem: &str, certified: &CertifiedKey) -> BTreeMap<String, ByteString> {
    BTreeMap::from([
        (CA_CRT.to_string(), ByteString(ca_cert_pem.as_bytes().to_vec())),
        (TLS_CRT.to_string(), ByteString(certified.cert_pem.clone().into_bytes())),
        (TLS_KEY.to_string(), ByteString(certified.key_pem.clone().into_bytes())),
    ])
}

fn authority_secret(hub_namespace: &str, name: &str, certified: &CertifiedKey) -> Secret {
    certificate_secret(hub_namespace, name, authority_fields(certified))
}

fn leaf_secret(
    hub_namespace: &str,
    name: &str,
    ca_cert_pem: &str,
    certified: &CertifiedKey,
) -> Secret {
    certificate_secret(hub_namespace, name, leaf_fields(ca_cert_pem, certified))
}

fn certificate_secret(
    hub_namespace: &str,
    name: &str,
    data: BTreeMap<String, ByteString>,
) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(hub_namespace.to_string()),
            labels: Some(crate::owner_labels()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ObservabilityFleetSpec;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use x509_parser::prelude::*;

    /// In-memory secret store for lifecycle tests
    #[derive(Default)]
    struct MemorySecrets {
        secrets: Mutex<BTreeMap<String, Secret>>,
    }

    impl MemorySecrets {
        fn get(&self, name: &str) -> Option<Secret> {
            self.secrets.lock().unwrap().get(name).cloned()
        }

        fn field(&self, name: &str, field: &str) -> Vec<u8> {
            self.get(name)
                .and_then(|s| s.data.as_ref().and_then(|d| d.get(field).cloned()))
                .map(|b| b.0)
                .unwrap_or_default()
        }

        fn corrupt_key(&self, name: &str) {
            let mut secrets = self.secrets.lock().unwrap();
            let secret = secrets.get_mut(name).unwrap();
            secret
                .data
                .as_mut()
                .unwrap()
                .insert(TLS_KEY.to_string(), ByteString(b"not a pem key".to_vec()));
        }
    }

    #[async_trait]
    impl SecretStore for MemorySecrets {
        async fn get_secret(&self, name: &str) -> Result<Option<Secret>, Error> {
            Ok(self.get(name))
        }

        async fn create_secret(&self, secret: &Secret) -> Result<(), Error> {
            let name = secret.metadata.name.clone().unwrap_or_default();
            self.secrets.lock().unwrap().insert(name, secret.clone());
            Ok(())
        }

        async fn update_secret(&self, secret: &Secret) -> Result<(), Error> {
            let name = secret.metadata.name.clone().unwrap_or_default();
            self.secrets.lock().unwrap().insert(name, secret.clone());
            Ok(())
        }
    }

    fn test_fleet(advertised: Option<&str>) -> ObservabilityFleet {
        ObservabilityFleet {
            metadata: ObjectMeta {
                name: Some(crate::FLEET_NAME.to_string()),
                ..Default::default()
            },
            spec: ObservabilityFleetSpec {
                advertised_address: advertised.map(String::from),
                ..Default::default()
            },
        }
    }

    fn pem_to_der(pem_bytes: &[u8]) -> Vec<u8> {
        ::pem::parse(pem_bytes).unwrap().contents().to_vec()
    }

    /// Verify that `cert` was signed by `authority` (both PEM bytes)
    fn verify_chain(cert_pem: &[u8], authority_pem: &[u8]) -> bool {
        let cert_der = pem_to_der(cert_pem);
        let ca_der = pem_to_der(authority_pem);
        let (_, cert) = X509Certificate::from_der(&cert_der).unwrap();
        let (_, ca) = X509Certificate::from_der(&ca_der).unwrap();
        cert.verify_signature(Some(ca.public_key())).is_ok()
    }

    fn public_key_of(cert_pem: &[u8]) -> Vec<u8> {
        let der = pem_to_der(cert_pem);
        let (_, cert) = X509Certificate::from_der(&der).unwrap();
        cert.public_key().raw.to_vec()
    }

    #[tokio::test]
    async fn bootstrap_creates_authorities_and_leaves() {
        let store = MemorySecrets::default();
        let fleet = test_fleet(Some("obs.example.com"));

        ensure_certificates(&store, "spyglass-system", &fleet)
            .await
            .unwrap();

        for name in [
            SERVER_CA_SECRET,
            CLIENT_CA_SECRET,
            SERVER_CERT_SECRET,
            PROXY_CERT_SECRET,
            MEMBER_CERT_SECRET,
        ] {
            let secret = store.get(name).unwrap_or_else(|| panic!("{name} missing"));
            let data = secret.data.unwrap();
            assert!(data.contains_key(CA_CRT), "{name} missing ca.crt");
            assert!(data.contains_key(TLS_CRT), "{name} missing tls.crt");
            assert!(data.contains_key(TLS_KEY), "{name} missing tls.key");
        }

        // PEM block types
        let cert = store.field(SERVER_CA_SECRET, TLS_CRT);
        assert!(String::from_utf8_lossy(&cert).contains("BEGIN CERTIFICATE"));
        let key = store.field(SERVER_CA_SECRET, TLS_KEY);
        assert!(String::from_utf8_lossy(&key).contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn authorities_are_self_signed_and_independent() {
        let store = MemorySecrets::default();
        ensure_certificates(&store, "spyglass-system", &test_fleet(None))
            .await
            .unwrap();

        let server_ca = store.field(SERVER_CA_SECRET, TLS_CRT);
        let client_ca = store.field(CLIENT_CA_SECRET, TLS_CRT);
        assert!(verify_chain(&server_ca, &server_ca));
        assert!(verify_chain(&client_ca, &client_ca));
        // Independent trust domains
        assert!(!verify_chain(&server_ca, &client_ca));
    }

    #[tokio::test]
    async fn leaves_chain_to_their_role_authority() {
        let store = MemorySecrets::default();
        ensure_certificates(&store, "spyglass-system", &test_fleet(None))
            .await
            .unwrap();

        let server_ca = store.field(SERVER_CA_SECRET, TLS_CRT);
        let client_ca = store.field(CLIENT_CA_SECRET, TLS_CRT);

        let server_leaf = store.field(SERVER_CERT_SECRET, TLS_CRT);
        assert!(verify_chain(&server_leaf, &server_ca));
        assert!(!verify_chain(&server_leaf, &client_ca));

        let proxy_leaf = store.field(PROXY_CERT_SECRET, TLS_CRT);
        assert!(verify_chain(&proxy_leaf, &client_ca));

        let member_leaf = store.field(MEMBER_CERT_SECRET, TLS_CRT);
        assert!(verify_chain(&member_leaf, &client_ca));

        // Each leaf secret carries its issuing authority's certificate as
        // the trust anchor
        assert_eq!(store.field(SERVER_CERT_SECRET, CA_CRT), server_ca);
        assert_eq!(store.field(PROXY_CERT_SECRET, CA_CRT), client_ca);
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let store = MemorySecrets::default();
        ensure_certificates(&store, "spyglass-system", &test_fleet(None))
            .await
            .unwrap();
        let before = store.field(SERVER_CA_SECRET, TLS_CRT);

        ensure_certificates(&store, "spyglass-system", &test_fleet(None))
            .await
            .unwrap();
        let after = store.field(SERVER_CA_SECRET, TLS_CRT);
        assert_eq!(before, after, "existing authority must be left untouched");
    }

    #[tokio::test]
    async fn missing_authority_fails_leaf_issuance_hard() {
        let store = MemorySecrets::default();
        let request = LeafRequest {
            name: PROXY_CERT_SECRET,
            server_role: false,
            common_name: PROXY_CERT_CN,
            org_units: Vec::new(),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
        };

        let result = ensure_leaf(&store, "spyglass-system", &request).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("authority secret"));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn rotation_preserves_a_parseable_key() {
        let store = MemorySecrets::default();
        ensure_certificates(&store, "spyglass-system", &test_fleet(None))
            .await
            .unwrap();

        let cert_before = store.field(SERVER_CA_SECRET, TLS_CRT);
        rotate_authority(&store, SERVER_CA_SECRET, SERVER_CA_CN)
            .await
            .unwrap();
        let cert_after = store.field(SERVER_CA_SECRET, TLS_CRT);

        assert_ne!(cert_before, cert_after, "certificate must be re-signed");
        assert_eq!(
            public_key_of(&cert_before),
            public_key_of(&cert_after),
            "rotation must keep the existing key pair"
        );
    }

    #[tokio::test]
    async fn corrupt_key_forces_fresh_generation_instead_of_failing() {
        let store = MemorySecrets::default();
        ensure_certificates(&store, "spyglass-system", &test_fleet(None))
            .await
            .unwrap();

        let key_before = public_key_of(&store.field(SERVER_CA_SECRET, TLS_CRT));
        store.corrupt_key(SERVER_CA_SECRET);

        rotate_authority(&store, SERVER_CA_SECRET, SERVER_CA_CN)
            .await
            .unwrap();

        let rotated = store.field(SERVER_CA_SECRET, TLS_CRT);
        let key_after = public_key_of(&rotated);
        assert_ne!(key_before, key_after, "a fresh key pair must be generated");
        assert!(verify_chain(&rotated, &rotated), "still self-signed");
        // The unusable key was replaced by a working one
        let key_pem = store.field(SERVER_CA_SECRET, TLS_KEY);
        assert!(String::from_utf8_lossy(&key_pem).contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn authority_rotation_propagates_to_rotated_leaves() {
        let store = MemorySecrets::default();
        ensure_certificates(&store, "spyglass-system", &test_fleet(None))
            .await
            .unwrap();

        let old_client_ca = store.field(CLIENT_CA_SECRET, TLS_CRT);

        // Rotate authorities first, then the dependent leaves
        rotate_certificates(&store, "spyglass-system", None)
            .await
            .unwrap();

        let new_client_ca = store.field(CLIENT_CA_SECRET, TLS_CRT);
        assert_ne!(old_client_ca, new_client_ca);

        let member_leaf = store.field(MEMBER_CERT_SECRET, TLS_CRT);
        assert!(
            verify_chain(&member_leaf, &new_client_ca),
            "rotated leaf must chain to the new authority"
        );
        assert_eq!(
            store.field(MEMBER_CERT_SECRET, CA_CRT),
            new_client_ca,
            "leaf trust anchor must be the new authority certificate"
        );
    }

    #[tokio::test]
    async fn rotation_without_stored_secret_is_a_skip() {
        let store = MemorySecrets::default();
        rotate_authority(&store, SERVER_CA_SECRET, SERVER_CA_CN)
            .await
            .unwrap();
        assert!(store.get(SERVER_CA_SECRET).is_none());
    }

    #[tokio::test]
    async fn server_leaf_sans_include_service_and_advertised_address() {
        let store = MemorySecrets::default();
        ensure_certificates(&store, "spyglass-system", &test_fleet(Some("obs.example.com")))
            .await
            .unwrap();

        let leaf = store.field(SERVER_CERT_SECRET, TLS_CRT);
        let der = pem_to_der(&leaf);
        let (_, cert) = X509Certificate::from_der(&der).unwrap();
        let sans: Vec<String> = cert
            .subject_alternative_name()
            .unwrap()
            .map(|ext| {
                ext.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some(dns.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        assert_eq!(sans[0], SERVER_CERT_CN, "common name must come first");
        assert!(sans.contains(&"spyglass-api.spyglass-system.svc".to_string()));
        assert!(sans.contains(&"obs.example.com".to_string()));
    }

    #[test]
    fn common_name_is_forced_first_without_duplication() {
        // CN absent from the caller list: prepended
        let names = normalize_dns_names("svc.example", &["a.example".to_string()]);
        assert_eq!(names, vec!["svc.example", "a.example"]);

        // CN already present later in the list: not duplicated
        let names = normalize_dns_names(
            "svc.example",
            &["a.example".to_string(), "svc.example".to_string()],
        );
        assert_eq!(names, vec!["svc.example", "a.example"]);

        // Empty caller list: CN alone
        let names = normalize_dns_names("svc.example", &[]);
        assert_eq!(names, vec!["svc.example"]);
    }
}
