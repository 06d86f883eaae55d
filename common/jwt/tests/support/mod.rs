#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

pub const SECRET: &[u8] = b"integration-secret";

pub struct RsaKeys {
    pub encoding: EncodingKey,
    pub public_pem: String,
    pub modulus: String,
    pub exponent: String,
}

pub fn generate_rsa() -> RsaKeys {
    let mut rng = OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
    let public_key = private_key.to_public_key();

    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .expect("private pem");
    let public_pem = public_key.to_pkcs1_pem(LineEnding::LF).expect("public pem");

    RsaKeys {
        encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
        public_pem,
        modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    }
}

pub fn jwk(keys: &RsaKeys, kid: &str) -> Value {
    json!({
        "kid": kid,
        "kty": "RSA",
        "alg": "RS256",
        "use": "sig",
        "n": keys.modulus,
        "e": keys.exponent
    })
}

pub fn sign_rs256(keys: &RsaKeys, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &keys.encoding).expect("sign token")
}

pub fn sign_hs256(claims: &Value) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(SECRET),
    )
    .expect("sign token")
}
