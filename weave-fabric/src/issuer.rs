//! Example operational credentials issuer.
//!
//! Mints a Root → Intermediate → Node Operational certificate chain on
//! request. Key material and CA certificates persist through the storage
//! contract under fixed key names so the same authority survives restarts.
//! Validity is anchored at 2021-01-01 UTC and runs for ten years.

use chrono::{DateTime, Months, Utc};
use const_oid::ObjectIdentifier;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{DerSignature, VerifyingKey};
use p256::pkcs8::EncodePublicKey;
use tracing::{debug, info};
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::asn1::{SetOfVec, UtcTime, Utf8StringRef};
use x509_cert::der::{Any, Decode, Encode};
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

use weave_core::config::{CERT_VALIDITY_START_EPOCH_SECS, CERT_VALIDITY_YEARS};
use weave_core::{Error, FabricId, NodeId, Result, Storage};
use weave_crypto::{drbg, P256Keypair, SymmetricKey};

use crate::tlv::{TlvReader, TlvTag};

/// Storage key for the root issuer keypair.
pub const CA_KEYPAIR_STORAGE_KEY: &str = "ExampleOpCredsCAKey";
/// Storage key for the intermediate issuer keypair.
pub const ICA_KEYPAIR_STORAGE_KEY: &str = "ExampleOpCredsICAKey";
/// Storage key for the root certificate DER.
pub const ROOT_CERT_STORAGE_KEY: &str = "ExampleCARootCert";
/// Storage key for the intermediate certificate DER.
pub const INTERMEDIATE_CERT_STORAGE_KEY: &str = "ExampleCAIntermediateCert";

/// Upper bound on a minted certificate's DER encoding.
const MAX_DER_CERT_LEN: usize = 600;

/// Fixed identity protection key handed back with every chain until
/// fabric-scoped IPK provisioning is plumbed through.
pub const DEFAULT_IPK: [u8; 16] = *b"temporary ipk 01";

const OID_NODE_ID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.1");
const OID_ICA_ID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.3");
const OID_ROOT_CA_ID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.4");
const OID_FABRIC_ID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.5");
const OID_CASE_AUTHENTICATED_TAG: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.6");

/// Result of a successful chain generation.
pub struct NocChain {
    pub noc: Vec<u8>,
    pub icac: Vec<u8>,
    pub rcac: Vec<u8>,
    pub ipk: SymmetricKey,
    pub admin_subject: Option<NodeId>,
}

/// Completion callback for [`OperationalCredentialsIssuer::generate_noc_chain`].
pub type OnNocChainGeneration<'a> = dyn FnMut(Result<NocChain>) + 'a;

/// Example certificate authority with persistent key material.
pub struct OperationalCredentialsIssuer {
    initialized: bool,
    issuer: Option<P256Keypair>,
    intermediate_issuer: Option<P256Keypair>,
    issuer_id: u64,
    intermediate_issuer_id: u64,
    next_fabric_id: FabricId,
    next_available_node_id: u64,
    requested_node_id: Option<NodeId>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl OperationalCredentialsIssuer {
    pub fn new() -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            initialized: false,
            issuer: None,
            intermediate_issuer: None,
            issuer_id: 1234,
            intermediate_issuer_id: 2345,
            next_fabric_id: FabricId(1),
            next_available_node_id: 1,
            requested_node_id: None,
            not_before: epoch,
            not_after: epoch,
        }
    }

    /// Load or create the issuer keypairs and fix the validity window.
    pub fn initialize(&mut self, storage: &mut dyn Storage) -> Result<()> {
        let not_before = DateTime::<Utc>::from_timestamp(CERT_VALIDITY_START_EPOCH_SECS as i64, 0)
            .ok_or(Error::Internal("validity start out of range"))?;
        let not_after = not_before
            .checked_add_months(Months::new(12 * CERT_VALIDITY_YEARS as u32))
            .ok_or(Error::Internal("validity end out of range"))?;
        self.not_before = not_before;
        self.not_after = not_after;

        self.issuer = Some(load_or_generate_keypair(storage, CA_KEYPAIR_STORAGE_KEY)?);
        self.intermediate_issuer =
            Some(load_or_generate_keypair(storage, ICA_KEYPAIR_STORAGE_KEY)?);
        self.initialized = true;
        Ok(())
    }

    /// Pin the node id assigned to the next chain request.
    pub fn set_node_id_for_next_noc_request(&mut self, node_id: NodeId) {
        self.requested_node_id = Some(node_id);
    }

    /// Pin the fabric id stamped into subsequent NOC subjects.
    pub fn set_fabric_id_for_next_noc_request(&mut self, fabric_id: FabricId) {
        self.next_fabric_id = fabric_id;
    }

    /// Generate a certificate chain from a CSR envelope.
    ///
    /// `csr_elements` is a TLV anonymous structure whose context-tag-1
    /// element is the DER-encoded CSR. Attestation inputs are accepted for
    /// interface compatibility; this example authority does not verify
    /// them. The completion callback fires once the chain is ready;
    /// envelope and CSR validation errors are returned without invoking it.
    pub fn generate_noc_chain(
        &mut self,
        storage: &mut dyn Storage,
        csr_elements: &[u8],
        attestation_signature: &[u8],
        dac: &[u8],
        pai: &[u8],
        paa: &[u8],
        on_completion: &mut OnNocChainGeneration<'_>,
    ) -> Result<()> {
        if !self.initialized {
            return Err(Error::IncorrectState("credentials issuer not initialized"));
        }
        debug!(
            attestation_signature_len = attestation_signature.len(),
            dac_len = dac.len(),
            pai_len = pai.len(),
            paa_len = paa.len(),
            "skipping device attestation verification"
        );

        let assigned_id = match self.requested_node_id.take() {
            Some(requested) => {
                // Keep the auto-increment cursor from re-issuing a
                // pre-requested id.
                if requested.get() == self.next_available_node_id {
                    self.next_available_node_id += 1;
                }
                requested
            }
            None => {
                let id = NodeId(self.next_available_node_id);
                self.next_available_node_id += 1;
                id
            }
        };

        info!("verifying certificate signing request");
        let mut reader = TlvReader::new(csr_elements);
        reader.expect_structure(TlvTag::Anonymous)?;
        let csr_der = reader.expect_octet_string(TlvTag::Context(1))?;

        let pubkey = verify_certificate_signing_request(csr_der)?;

        let fabric_id = self.next_fabric_id;
        let (rcac, icac, noc) =
            self.generate_noc_chain_after_validation(storage, assigned_id, fabric_id, &[], &pubkey)?;

        info!(node_id = %assigned_id, %fabric_id, "providing certificate chain to the commissioner");
        on_completion(Ok(NocChain {
            noc,
            icac,
            rcac,
            ipk: SymmetricKey(DEFAULT_IPK),
            admin_subject: None,
        }));
        Ok(())
    }

    /// Mint (or load) RCAC and ICAC, then mint the NOC for `pubkey`.
    pub fn generate_noc_chain_after_validation(
        &self,
        storage: &mut dyn Storage,
        node_id: NodeId,
        fabric_id: FabricId,
        cats: &[u32],
        pubkey: &VerifyingKey,
    ) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
        let issuer = self
            .issuer
            .as_ref()
            .ok_or(Error::IncorrectState("credentials issuer not initialized"))?;
        let intermediate = self
            .intermediate_issuer
            .as_ref()
            .ok_or(Error::IncorrectState("credentials issuer not initialized"))?;

        // Root certificate: load the persisted DER and recover its subject,
        // or mint and persist a fresh one.
        let (rcac, rcac_dn) = match storage.get(ROOT_CERT_STORAGE_KEY)? {
            Some(stored) => {
                let subject = extract_subject(&stored)?;
                (stored, subject)
            }
            None => {
                info!("generating RCAC");
                let rcac_dn = single_attribute_dn(OID_ROOT_CA_ID, self.issuer_id)?;
                let minted = self.mint_certificate(
                    Profile::Root,
                    &[0],
                    rcac_dn.clone(),
                    &issuer.verifying_key(),
                    issuer,
                )?;
                storage.set(ROOT_CERT_STORAGE_KEY, &minted)?;
                (minted, rcac_dn)
            }
        };

        // Intermediate certificate, same load-or-mint split with its own
        // buffer.
        let (icac, icac_dn) = match storage.get(INTERMEDIATE_CERT_STORAGE_KEY)? {
            Some(stored) => {
                let subject = extract_subject(&stored)?;
                (stored, subject)
            }
            None => {
                info!("generating ICAC");
                let icac_dn = single_attribute_dn(OID_ICA_ID, self.intermediate_issuer_id)?;
                let minted = self.mint_certificate(
                    Profile::SubCA {
                        issuer: rcac_dn.clone(),
                        path_len_constraint: None,
                    },
                    &[0],
                    icac_dn.clone(),
                    &intermediate.verifying_key(),
                    issuer,
                )?;
                storage.set(INTERMEDIATE_CERT_STORAGE_KEY, &minted)?;
                (minted, icac_dn)
            }
        };

        info!("generating NOC");
        let noc_dn = noc_dn(fabric_id, node_id, cats)?;
        let noc = self.mint_certificate(
            Profile::Leaf {
                issuer: icac_dn,
                enable_key_agreement: false,
                enable_key_encipherment: false,
            },
            &[1],
            noc_dn,
            pubkey,
            intermediate,
        )?;

        Ok((rcac, icac, noc))
    }

    fn mint_certificate(
        &self,
        profile: Profile,
        serial: &[u8],
        subject: Name,
        subject_key: &VerifyingKey,
        signer: &P256Keypair,
    ) -> Result<Vec<u8>> {
        let spki_der = subject_key
            .to_public_key_der()
            .map_err(|e| Error::crypto(format!("subject public key encoding: {e}")))?;
        let spki = SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes())
            .map_err(|e| Error::crypto(format!("subject public key decoding: {e}")))?;
        let serial = SerialNumber::new(serial)
            .map_err(|e| Error::crypto(format!("serial number: {e}")))?;
        let validity = Validity {
            not_before: x509_time(self.not_before)?,
            not_after: x509_time(self.not_after)?,
        };
        let builder =
            CertificateBuilder::new(profile, serial, validity, subject, spki, signer.signing_key())
                .map_err(|e| Error::crypto(format!("certificate builder: {e}")))?;
        let cert = builder
            .build::<DerSignature>()
            .map_err(|e| Error::crypto(format!("certificate signing: {e}")))?;
        let der = cert
            .to_der()
            .map_err(|e| Error::crypto(format!("certificate encoding: {e}")))?;
        if der.len() > MAX_DER_CERT_LEN {
            return Err(Error::NoMemory("certificate"));
        }
        Ok(der)
    }

    /// Draw a random id in the operational range; gives up after ten draws.
    pub fn random_operational_node_id() -> Result<NodeId> {
        for _ in 0..10 {
            let candidate = NodeId(drbg::random_u64()?);
            if candidate.is_operational() {
                return Ok(candidate);
            }
        }
        // With a healthy DRBG this is a ~2^-280 event.
        Err(Error::Internal("drbg kept yielding reserved node ids"))
    }
}

impl Default for OperationalCredentialsIssuer {
    fn default() -> Self {
        Self::new()
    }
}

fn load_or_generate_keypair(storage: &mut dyn Storage, key: &str) -> Result<P256Keypair> {
    match storage.get(key)? {
        Some(blob) => P256Keypair::deserialize(&blob),
        None => {
            info!(key = %key, "keypair not in storage, generating");
            let pair = P256Keypair::generate()?;
            storage.set(key, &pair.serialize())?;
            Ok(pair)
        }
    }
}

/// Verify a DER CSR's self-signature and recover the subject public key.
pub fn verify_certificate_signing_request(csr_der: &[u8]) -> Result<VerifyingKey> {
    let csr = CertReq::from_der(csr_der).map_err(|e| Error::crypto(format!("csr decode: {e}")))?;
    let pubkey = VerifyingKey::from_sec1_bytes(csr.info.public_key.subject_public_key.raw_bytes())
        .map_err(|e| Error::crypto(format!("csr public key: {e}")))?;
    let message = csr
        .info
        .to_der()
        .map_err(|e| Error::crypto(format!("csr re-encoding: {e}")))?;
    let signature = DerSignature::try_from(csr.signature.raw_bytes())
        .map_err(|e| Error::crypto(format!("csr signature: {e}")))?;
    pubkey
        .verify(&message, &signature)
        .map_err(|_| Error::crypto("csr signature verification failed"))?;
    Ok(pubkey)
}

/// Build the matter-style envelope carried in a CSR response.
pub fn nocsr_elements(csr_der: &[u8]) -> Vec<u8> {
    crate::tlv::octet_string_envelope(1, csr_der)
}

fn x509_time(at: DateTime<Utc>) -> Result<Time> {
    let duration = std::time::Duration::from_secs(at.timestamp() as u64);
    UtcTime::from_unix_duration(duration)
        .map(Time::UtcTime)
        .map_err(|e| Error::crypto(format!("certificate validity: {e}")))
}

/// 64-bit DN attribute values render as 16 uppercase hex characters.
fn dn_attribute(oid: ObjectIdentifier, value: u64, width: usize) -> Result<RelativeDistinguishedName> {
    let rendered = format!("{value:0width$X}");
    let utf8 = Utf8StringRef::new(&rendered)
        .map_err(|e| Error::crypto(format!("dn attribute: {e}")))?;
    let attribute = x509_cert::attr::AttributeTypeAndValue {
        oid,
        value: Any::from(utf8),
    };
    let set = SetOfVec::try_from(vec![attribute])
        .map_err(|e| Error::crypto(format!("dn attribute set: {e}")))?;
    Ok(RelativeDistinguishedName(set))
}

fn single_attribute_dn(oid: ObjectIdentifier, value: u64) -> Result<Name> {
    Ok(RdnSequence(vec![dn_attribute(oid, value, 16)?]))
}

fn noc_dn(fabric_id: FabricId, node_id: NodeId, cats: &[u32]) -> Result<Name> {
    let mut rdns = vec![
        dn_attribute(OID_FABRIC_ID, fabric_id.get(), 16)?,
        dn_attribute(OID_NODE_ID, node_id.get(), 16)?,
    ];
    for cat in cats {
        rdns.push(dn_attribute(OID_CASE_AUTHENTICATED_TAG, *cat as u64, 8)?);
    }
    Ok(RdnSequence(rdns))
}

fn extract_subject(cert_der: &[u8]) -> Result<Name> {
    let cert = Certificate::from_der(cert_der)
        .map_err(|e| Error::crypto(format!("stored certificate decode: {e}")))?;
    Ok(cert.tbs_certificate.subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_persists_keypairs_under_literal_keys() {
        let mut issuer = OperationalCredentialsIssuer::new();
        let mut storage = weave_core::MemoryStorage::new();
        issuer.initialize(&mut storage).unwrap();
        assert!(storage.get(CA_KEYPAIR_STORAGE_KEY).unwrap().is_some());
        assert!(storage.get(ICA_KEYPAIR_STORAGE_KEY).unwrap().is_some());
    }

    #[test]
    fn random_node_id_is_operational() {
        let id = OperationalCredentialsIssuer::random_operational_node_id().unwrap();
        assert!(id.is_operational());
    }

    #[test]
    fn dn_attribute_renders_fixed_width_hex() {
        let rdn = dn_attribute(OID_NODE_ID, 0xAB, 16).unwrap();
        let attribute = rdn.0.as_slice().first().unwrap();
        assert_eq!(attribute.oid, OID_NODE_ID);
        assert_eq!(attribute.value.value(), b"00000000000000AB");

        let cat = dn_attribute(OID_CASE_AUTHENTICATED_TAG, 0xABCD_0001, 8).unwrap();
        assert_eq!(cat.0.as_slice().first().unwrap().value.value(), b"ABCD0001");
    }

    #[test]
    fn generate_before_initialize_is_rejected() {
        let mut issuer = OperationalCredentialsIssuer::new();
        let mut storage = weave_core::MemoryStorage::new();
        let mut called = false;
        let mut on_completion = |_: Result<NocChain>| called = true;
        let err = issuer.generate_noc_chain(
            &mut storage,
            &[],
            &[],
            &[],
            &[],
            &[],
            &mut on_completion,
        );
        assert!(matches!(err, Err(Error::IncorrectState(_))));
        assert!(!called);
    }
}
