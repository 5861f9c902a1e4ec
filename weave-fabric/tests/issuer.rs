//! Credential chain generation against empty storage, driven end to end
//! through the CSR envelope.

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{DerSignature, VerifyingKey};
use x509_cert::builder::{Builder, RequestBuilder};
use const_oid::ObjectIdentifier;
use x509_cert::der::{Decode, Encode};
use x509_cert::name::RdnSequence;
use x509_cert::Certificate;

use weave_core::{Error, FabricId, MemoryStorage, NodeId};
use weave_crypto::P256Keypair;
use weave_fabric::issuer::{nocsr_elements, OperationalCredentialsIssuer};
use weave_fabric::NocChain;

const OID_NODE_ID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.1");
const OID_FABRIC_ID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.5");

// 2021-01-01T00:00:00Z and 2031-01-01T00:00:00Z.
const VALIDITY_START_SECS: u64 = 1_609_459_200;
const VALIDITY_END_SECS: u64 = 1_924_992_000;

fn csr_for(keypair: &P256Keypair) -> Vec<u8> {
    let builder = RequestBuilder::new(RdnSequence::default(), keypair.signing_key())
        .expect("request builder");
    let request = builder.build::<DerSignature>().expect("sign csr");
    request.to_der().expect("encode csr")
}

fn generate_chain(
    issuer: &mut OperationalCredentialsIssuer,
    storage: &mut MemoryStorage,
    csr_envelope: &[u8],
) -> NocChain {
    let mut produced = None;
    let mut on_completion = |result: Result<NocChain, Error>| {
        produced = Some(result.expect("chain generation succeeds"));
    };
    issuer
        .generate_noc_chain(storage, csr_envelope, &[], &[], &[], &[], &mut on_completion)
        .expect("generate_noc_chain");
    produced.expect("completion callback fired")
}

fn verifying_key_of(cert: &Certificate) -> VerifyingKey {
    VerifyingKey::from_sec1_bytes(
        cert.tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes(),
    )
    .expect("certificate public key")
}

fn assert_signed_by(cert: &Certificate, signer: &Certificate) {
    let message = cert.tbs_certificate.to_der().expect("tbs encoding");
    let signature =
        DerSignature::try_from(cert.signature.raw_bytes()).expect("certificate signature");
    verifying_key_of(signer)
        .verify(&message, &signature)
        .expect("signature verifies");
}

fn subject_values(cert: &Certificate) -> Vec<(ObjectIdentifier, Vec<u8>)> {
    cert.tbs_certificate
        .subject
        .0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .map(|attr| (attr.oid, attr.value.value().to_vec()))
        .collect()
}

#[test]
fn chain_generation_against_empty_storage() {
    let mut storage = MemoryStorage::new();
    let mut issuer = OperationalCredentialsIssuer::new();
    issuer.initialize(&mut storage).expect("initialize");

    let node_keypair = P256Keypair::generate().expect("node keypair");
    let envelope = nocsr_elements(&csr_for(&node_keypair));

    issuer.set_fabric_id_for_next_noc_request(FabricId(0xFAB5));
    issuer.set_node_id_for_next_noc_request(NodeId(0xDEDE));

    let chain = generate_chain(&mut issuer, &mut storage, &envelope);

    let rcac = Certificate::from_der(&chain.rcac).expect("rcac DER");
    let icac = Certificate::from_der(&chain.icac).expect("icac DER");
    let noc = Certificate::from_der(&chain.noc).expect("noc DER");

    // Chain verifies up to the root, and the root signs itself.
    assert_signed_by(&noc, &icac);
    assert_signed_by(&icac, &rcac);
    assert_signed_by(&rcac, &rcac);

    // NOC carries the requested fabric and node ids, and binds the CSR key.
    let subject = subject_values(&noc);
    assert!(subject.contains(&(OID_FABRIC_ID, b"000000000000FAB5".to_vec())));
    assert!(subject.contains(&(OID_NODE_ID, b"000000000000DEDE".to_vec())));
    assert_eq!(
        verifying_key_of(&noc),
        node_keypair.verifying_key(),
        "NOC must certify the CSR public key"
    );

    // Validity is [2021-01-01, 2031-01-01].
    for cert in [&rcac, &icac, &noc] {
        let validity = &cert.tbs_certificate.validity;
        assert_eq!(
            validity.not_before.to_unix_duration().as_secs(),
            VALIDITY_START_SECS
        );
        assert_eq!(
            validity.not_after.to_unix_duration().as_secs(),
            VALIDITY_END_SECS
        );
    }

    assert_eq!(&chain.ipk.0, b"temporary ipk 01");
    assert!(chain.admin_subject.is_none());
}

#[test]
fn ca_certificates_are_reused_across_requests_and_restarts() {
    let mut storage = MemoryStorage::new();
    let mut issuer = OperationalCredentialsIssuer::new();
    issuer.initialize(&mut storage).expect("initialize");

    let first_envelope = nocsr_elements(&csr_for(&P256Keypair::generate().unwrap()));
    let first = generate_chain(&mut issuer, &mut storage, &first_envelope);

    // Second request on the same issuer: same CA material, new NOC.
    let second_envelope = nocsr_elements(&csr_for(&P256Keypair::generate().unwrap()));
    let second = generate_chain(&mut issuer, &mut storage, &second_envelope);
    assert_eq!(first.rcac, second.rcac);
    assert_eq!(first.icac, second.icac);
    assert_ne!(first.noc, second.noc);

    // Fresh issuer over the same storage picks up the persisted authority.
    let mut restarted = OperationalCredentialsIssuer::new();
    restarted.initialize(&mut storage).expect("re-initialize");
    let third_envelope = nocsr_elements(&csr_for(&P256Keypair::generate().unwrap()));
    let third = generate_chain(&mut restarted, &mut storage, &third_envelope);
    assert_eq!(first.rcac, third.rcac);
    assert_eq!(first.icac, third.icac);
}

#[test]
fn auto_assigned_node_ids_increment() {
    let mut storage = MemoryStorage::new();
    let mut issuer = OperationalCredentialsIssuer::new();
    issuer.initialize(&mut storage).expect("initialize");

    let mut observed = Vec::new();
    for _ in 0..2 {
        let envelope = nocsr_elements(&csr_for(&P256Keypair::generate().unwrap()));
        let chain = generate_chain(&mut issuer, &mut storage, &envelope);
        let noc = Certificate::from_der(&chain.noc).unwrap();
        let subject = subject_values(&noc);
        let node_value = subject
            .into_iter()
            .find(|(oid, _)| *oid == OID_NODE_ID)
            .map(|(_, v)| v)
            .expect("node id attribute");
        observed.push(node_value);
    }
    assert_eq!(observed[0], b"0000000000000001".to_vec());
    assert_eq!(observed[1], b"0000000000000002".to_vec());
}

#[test]
fn malformed_envelope_is_rejected_before_the_callback() {
    let mut storage = MemoryStorage::new();
    let mut issuer = OperationalCredentialsIssuer::new();
    issuer.initialize(&mut storage).expect("initialize");

    let mut called = false;
    let mut on_completion = |_: Result<NocChain, Error>| called = true;

    // Top-level element is a uint, not a structure.
    let not_a_structure = [0x04u8, 0x01];
    let err = issuer.generate_noc_chain(
        &mut storage,
        &not_a_structure,
        &[],
        &[],
        &[],
        &[],
        &mut on_completion,
    );
    assert!(matches!(err, Err(Error::WrongTlvType)));

    // Structure whose inner octet string carries the wrong context tag.
    let wrong_tag = weave_fabric::tlv::octet_string_envelope(2, b"whatever");
    let err = issuer.generate_noc_chain(
        &mut storage,
        &wrong_tag,
        &[],
        &[],
        &[],
        &[],
        &mut on_completion,
    );
    assert!(matches!(err, Err(Error::UnexpectedTlvElement)));

    // A valid envelope around garbage DER fails CSR validation.
    let garbage = nocsr_elements(b"not a csr");
    let err = issuer.generate_noc_chain(
        &mut storage,
        &garbage,
        &[],
        &[],
        &[],
        &[],
        &mut on_completion,
    );
    assert!(matches!(err, Err(Error::Crypto(_))));

    assert!(!called);
}
