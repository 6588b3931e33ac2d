use certpulse_common::types::{DomainTrackingInfo, Status};
use chrono::{DateTime, Utc};
use ::pem::{EncodeConfig, LineEnding, Pem};
use sha2::{Digest, Sha256};
use x509_parser::oid_registry::{self, Oid};
use x509_parser::prelude::*;

use super::ProbeError;

/// Derives the tracking fields from a DER leaf certificate.
pub fn tracking_info(
    leaf_der: &[u8],
    server_ip: String,
    latency_ms: u64,
    now: DateTime<Utc>,
) -> Result<DomainTrackingInfo, ProbeError> {
    let (_, cert) = X509Certificate::from_der(leaf_der)
        .map_err(|e| ProbeError::Certificate(format!("failed to parse leaf certificate: {e}")))?;

    let not_after = cert.validity().not_after.timestamp();
    let expires = DateTime::from_timestamp(not_after, 0)
        .ok_or_else(|| ProbeError::Certificate(format!("not_after out of range: {not_after}")))?;

    let signature: &[u8] = &cert.signature_value.data;

    Ok(DomainTrackingInfo {
        server_ip,
        issuer: issuer_organization(&cert),
        signature_algo: oid_to_sig_name(&cert.signature_algorithm.algorithm),
        public_key_algo: oid_to_pk_name(&cert.public_key().algorithm.algorithm),
        encoded_pem: encode_pem(leaf_der),
        public_key: sha256_hex(cert.public_key().raw),
        signature: sha256_hex(signature),
        dns_names: dns_names(&cert).join(", "),
        key_usage: key_usage(&cert),
        ext_key_usages: extended_key_usages(&cert),
        expires: Some(expires),
        status: Status::for_expiry(expires, now),
        last_poll_at: Some(now),
        latency_ms,
        error: String::new(),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// PEM armor with 64-column base64 lines and `\n` line endings.
pub fn encode_pem(der: &[u8]) -> String {
    ::pem::encode_config(
        &Pem::new("CERTIFICATE", der.to_vec()),
        EncodeConfig::new().set_line_ending(LineEnding::LF),
    )
}

fn issuer_organization(cert: &X509Certificate) -> String {
    cert.issuer()
        .iter_organization()
        .next()
        .and_then(|o| o.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn dns_names(cert: &X509Certificate) -> Vec<String> {
    cert.subject_alternative_name()
        .ok()
        .flatten()
        .map(|san| {
            san.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn oid_to_sig_name(oid: &Oid) -> String {
    let known = [
        (oid_registry::OID_PKCS1_SHA256WITHRSA, "SHA256-RSA"),
        (oid_registry::OID_PKCS1_SHA384WITHRSA, "SHA384-RSA"),
        (oid_registry::OID_PKCS1_SHA512WITHRSA, "SHA512-RSA"),
        (oid_registry::OID_PKCS1_SHA1WITHRSA, "SHA1-RSA"),
        (oid_registry::OID_PKCS1_RSASSAPSS, "RSASSA-PSS"),
        (oid_registry::OID_SIG_ECDSA_WITH_SHA256, "ECDSA-SHA256"),
        (oid_registry::OID_SIG_ECDSA_WITH_SHA384, "ECDSA-SHA384"),
        (oid_registry::OID_SIG_ECDSA_WITH_SHA512, "ECDSA-SHA512"),
        (oid_registry::OID_SIG_ED25519, "Ed25519"),
    ];
    for (known_oid, name) in &known {
        if oid == known_oid {
            return name.to_string();
        }
    }
    format!("{oid}")
}

fn oid_to_pk_name(oid: &Oid) -> String {
    let known = [
        (oid_registry::OID_PKCS1_RSAENCRYPTION, "RSA"),
        (oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY, "ECDSA"),
        (oid_registry::OID_SIG_ED25519, "Ed25519"),
    ];
    for (known_oid, name) in &known {
        if oid == known_oid {
            return name.to_string();
        }
    }
    format!("{oid}")
}

/// Comma-joined names of the key usage bits present. Empty without the
/// extension.
fn key_usage(cert: &X509Certificate) -> String {
    let ku = match cert.key_usage() {
        Ok(Some(ku)) => ku,
        _ => return String::new(),
    };

    let flags = &ku.value;
    let bits = [
        (flags.digital_signature(), "digital signature"),
        (flags.non_repudiation(), "content commitment"),
        (flags.key_encipherment(), "key encipherment"),
        (flags.data_encipherment(), "data encipherment"),
        (flags.key_agreement(), "key agreement"),
        (flags.key_cert_sign(), "certificate sign"),
        (flags.crl_sign(), "CRL sign"),
        (flags.encipher_only(), "encipher only"),
        (flags.decipher_only(), "decipher only"),
    ];
    bits.iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn extended_key_usages(cert: &X509Certificate) -> Vec<String> {
    let eku = match cert.extended_key_usage() {
        Ok(Some(eku)) => eku,
        _ => return Vec::new(),
    };

    let value = &eku.value;
    let mut usages = Vec::new();
    if value.any {
        usages.push("any".to_string());
    }
    if value.server_auth {
        usages.push("server auth".to_string());
    }
    if value.client_auth {
        usages.push("client auth".to_string());
    }
    if value.code_signing {
        usages.push("code signing".to_string());
    }
    if value.email_protection {
        usages.push("email protection".to_string());
    }
    if value.time_stamping {
        usages.push("time stamping".to_string());
    }
    if value.ocsp_signing {
        usages.push("OCSP signing".to_string());
    }
    for oid in &value.other {
        usages.push(format!("{oid}"));
    }
    usages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_wraps_at_64_columns() {
        let der = vec![0xABu8; 100];
        let armored = encode_pem(&der);
        let lines: Vec<&str> = armored.lines().collect();
        assert_eq!(lines.first(), Some(&"-----BEGIN CERTIFICATE-----"));
        assert_eq!(lines.last(), Some(&"-----END CERTIFICATE-----"));
        // 100 bytes -> 136 base64 chars -> 64 + 64 + 8
        assert_eq!(lines[1].len(), 64);
        assert_eq!(lines[2].len(), 64);
        assert_eq!(lines[3].len(), 8);
        assert!(!armored.contains('\r'));

        let parsed = ::pem::parse(&armored).unwrap();
        assert_eq!(parsed.tag(), "CERTIFICATE");
        assert_eq!(parsed.contents(), der.as_slice());
    }

    #[test]
    fn sha256_hex_is_lowercase_and_fixed_size() {
        let hex = sha256_hex(b"certpulse");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(hex, sha256_hex(b"certpulse"));
        assert_ne!(hex, sha256_hex(b"certpulse!"));
    }

    #[test]
    fn garbage_leaf_is_a_certificate_error() {
        let err = tracking_info(b"not a certificate", String::new(), 1, Utc::now()).unwrap_err();
        assert!(matches!(err, ProbeError::Certificate(_)));
    }
}
