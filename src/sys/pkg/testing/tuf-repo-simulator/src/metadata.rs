// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! TUF role metadata and the signed envelope that carries it.
//!
//! Every type here is plain mutable data. Nothing keeps a repository consistent; that is left to
//! whoever edits the metadata.

use {
    crate::crypto::{self, calculate_hashes, HashAlgorithm, Signer},
    chrono::{DateTime, Utc},
    indexmap::IndexMap,
    ring::signature::{UnparsedPublicKey, ED25519},
    serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize},
    std::{collections::BTreeMap, fmt},
    thiserror::Error,
};

/// TUF format version written into every role.
pub const SPEC_VERSION: &str = "1.0.19";

pub const ROOT: &str = "root";
pub const TIMESTAMP: &str = "timestamp";
pub const SNAPSHOT: &str = "snapshot";
pub const TARGETS: &str = "targets";

/// Names of the four roles every repository starts with.
pub const TOP_LEVEL_ROLES: [&str; 4] = [ROOT, TIMESTAMP, SNAPSHOT, TARGETS];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("role {0} is not listed in this metadata")]
    UnknownRole(String),
}

/// Common behavior of the payload carried in a [`Signed`] envelope.
pub trait Metadata: Serialize + DeserializeOwned + Clone + fmt::Debug {
    /// Value of the `_type` field.
    const ROLE: &'static str;

    fn version(&self) -> u32;
}

/// Identifier of a [`Key`]: the hex sha256 of the key's canonical JSON.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub public: String,
}

/// A public key that roles can be authorized to sign with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyValue,
}

impl Key {
    pub fn ed25519(public: &[u8]) -> Self {
        Key {
            keytype: "ed25519".into(),
            scheme: "ed25519".into(),
            keyval: KeyValue { public: hex::encode(public) },
        }
    }

    pub fn key_id(&self) -> KeyId {
        // `Value`'s Display writes compact JSON with sorted keys, which is the canonical form.
        let canonical = serde_json::json!({
            "keytype": self.keytype,
            "scheme": self.scheme,
            "keyval": { "public": self.keyval.public },
        })
        .to_string();
        KeyId(HashAlgorithm::Sha256.hex_digest(canonical.as_bytes()))
    }

    /// Whether `signature` is a valid signature over `message` by this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let (public, sig) = match (hex::decode(&self.keyval.public), hex::decode(&signature.sig)) {
            (Ok(public), Ok(sig)) => (public, sig),
            _ => return false,
        };
        UnparsedPublicKey::new(&ED25519, public).verify(message, &sig).is_ok()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: KeyId,
    pub sig: String,
}

/// The keys authorized to sign for a role, and how many of them must.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<KeyId>,
    pub threshold: u32,
}

impl RoleKeys {
    pub fn new(threshold: u32) -> Self {
        RoleKeys { keyids: vec![], threshold }
    }
}

impl Default for RoleKeys {
    fn default() -> Self {
        RoleKeys::new(1)
    }
}

/// Version pointer from snapshot or timestamp to another metadata file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<BTreeMap<String, String>>,
}

impl MetaFile {
    pub fn new(version: u32) -> Self {
        MetaFile { version, length: None, hashes: None }
    }
}

/// Description of a target artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFile {
    /// Target path; serialized as the key of the `targets` map rather than as a field.
    #[serde(skip)]
    pub path: String,
    pub length: u64,
    pub hashes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
}

impl TargetFile {
    pub fn from_data(path: impl Into<String>, data: &[u8], algorithms: &[HashAlgorithm]) -> Self {
        TargetFile {
            path: path.into(),
            length: data.len() as u64,
            hashes: calculate_hashes(data, algorithms),
            custom: None,
        }
    }
}

/// A child role of a targets role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: String,
    pub keyids: Vec<KeyId>,
    pub threshold: u32,
    pub terminating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_hash_prefixes: Option<Vec<String>>,
}

/// Keys trusted for delegated roles, and the delegated roles in priority order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegations {
    pub keys: BTreeMap<KeyId, Key>,
    #[serde(with = "ordered_roles")]
    pub roles: IndexMap<String, DelegatedRole>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "root")]
pub struct Root {
    pub spec_version: String,
    pub version: u32,
    #[serde(with = "expiration")]
    pub expires: DateTime<Utc>,
    pub consistent_snapshot: bool,
    pub keys: BTreeMap<KeyId, Key>,
    pub roles: BTreeMap<String, RoleKeys>,
}

impl Root {
    /// Creates a root with every top-level role present, keyless, with a threshold of 1.
    pub fn new(version: u32, expires: DateTime<Utc>, consistent_snapshot: bool) -> Self {
        Root {
            spec_version: SPEC_VERSION.into(),
            version,
            expires,
            consistent_snapshot,
            keys: BTreeMap::new(),
            roles: TOP_LEVEL_ROLES
                .iter()
                .map(|role| (role.to_string(), RoleKeys::default()))
                .collect(),
        }
    }

    /// Authorizes `key` for `role`.
    pub fn add_key(&mut self, role: &str, key: Key) -> Result<(), MetadataError> {
        let role_keys =
            self.roles.get_mut(role).ok_or_else(|| MetadataError::UnknownRole(role.into()))?;
        add_key_to(&mut self.keys, &mut role_keys.keyids, key);
        Ok(())
    }

    /// Removes `key_id` from `role`, forgetting the key if no other role uses it.
    pub fn revoke_key(&mut self, role: &str, key_id: &KeyId) -> Result<(), MetadataError> {
        let role_keys =
            self.roles.get_mut(role).ok_or_else(|| MetadataError::UnknownRole(role.into()))?;
        role_keys.keyids.retain(|id| id != key_id);
        if !self.roles.values().any(|r| r.keyids.contains(key_id)) {
            self.keys.remove(key_id);
        }
        Ok(())
    }
}

impl Metadata for Root {
    const ROLE: &'static str = ROOT;

    fn version(&self) -> u32 {
        self.version
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "timestamp")]
pub struct Timestamp {
    pub spec_version: String,
    pub version: u32,
    #[serde(with = "expiration")]
    pub expires: DateTime<Utc>,
    #[serde(rename = "meta", with = "snapshot_meta")]
    pub snapshot_meta: MetaFile,
}

impl Timestamp {
    pub fn new(version: u32, expires: DateTime<Utc>, snapshot_meta: MetaFile) -> Self {
        Timestamp { spec_version: SPEC_VERSION.into(), version, expires, snapshot_meta }
    }
}

impl Metadata for Timestamp {
    const ROLE: &'static str = TIMESTAMP;

    fn version(&self) -> u32 {
        self.version
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "snapshot")]
pub struct Snapshot {
    pub spec_version: String,
    pub version: u32,
    #[serde(with = "expiration")]
    pub expires: DateTime<Utc>,
    /// Keyed by `"{role}.json"`.
    pub meta: BTreeMap<String, MetaFile>,
}

impl Snapshot {
    pub fn new(version: u32, expires: DateTime<Utc>, meta: BTreeMap<String, MetaFile>) -> Self {
        Snapshot { spec_version: SPEC_VERSION.into(), version, expires, meta }
    }
}

impl Metadata for Snapshot {
    const ROLE: &'static str = SNAPSHOT;

    fn version(&self) -> u32 {
        self.version
    }
}

/// Payload of the top-level targets role and of every delegated role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "targets")]
pub struct Targets {
    pub spec_version: String,
    pub version: u32,
    #[serde(with = "expiration")]
    pub expires: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_target_files")]
    pub targets: BTreeMap<String, TargetFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,
}

impl Targets {
    pub fn new(version: u32, expires: DateTime<Utc>) -> Self {
        Targets {
            spec_version: SPEC_VERSION.into(),
            version,
            expires,
            targets: BTreeMap::new(),
            delegations: None,
        }
    }

    /// Authorizes `key` for the delegated role `role`.
    pub fn add_key(&mut self, role: &str, key: Key) -> Result<(), MetadataError> {
        let delegations = self
            .delegations
            .as_mut()
            .ok_or_else(|| MetadataError::UnknownRole(role.into()))?;
        let delegated = delegations
            .roles
            .get_mut(role)
            .ok_or_else(|| MetadataError::UnknownRole(role.into()))?;
        add_key_to(&mut delegations.keys, &mut delegated.keyids, key);
        Ok(())
    }

    /// Removes `key_id` from the delegated role `role`, forgetting the key if no other delegated
    /// role uses it.
    pub fn revoke_key(&mut self, role: &str, key_id: &KeyId) -> Result<(), MetadataError> {
        let delegations = self
            .delegations
            .as_mut()
            .ok_or_else(|| MetadataError::UnknownRole(role.into()))?;
        let delegated = delegations
            .roles
            .get_mut(role)
            .ok_or_else(|| MetadataError::UnknownRole(role.into()))?;
        delegated.keyids.retain(|id| id != key_id);
        if !delegations.roles.values().any(|r| r.keyids.contains(key_id)) {
            delegations.keys.remove(key_id);
        }
        Ok(())
    }
}

impl Metadata for Targets {
    const ROLE: &'static str = TARGETS;

    fn version(&self) -> u32 {
        self.version
    }
}

fn add_key_to(keys: &mut BTreeMap<KeyId, Key>, keyids: &mut Vec<KeyId>, key: Key) {
    let key_id = key.key_id();
    if !keyids.contains(&key_id) {
        keyids.push(key_id.clone());
    }
    keys.insert(key_id, key);
}

/// A metadata payload together with the signatures over its canonical form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signatures: Vec<Signature>,
    pub signed: T,
}

impl<T: Metadata> Signed<T> {
    /// Wraps `signed` with no signatures.
    pub fn new(signed: T) -> Self {
        Signed { signatures: vec![], signed }
    }

    /// The bytes that signatures are computed over.
    pub fn canonical_signed(&self) -> Result<Vec<u8>, serde_json::Error> {
        crypto::canonicalize(&self.signed)
    }

    /// Signs the current payload with `signer`, replacing any earlier signature by the same key.
    pub fn sign(&mut self, signer: &Signer) -> Result<(), serde_json::Error> {
        let signature = signer.sign(&self.canonical_signed()?);
        match self.signatures.iter_mut().find(|s| s.keyid == signature.keyid) {
            Some(existing) => *existing = signature,
            None => self.signatures.push(signature),
        }
        Ok(())
    }

    /// Serializes the envelope as indented JSON with sorted keys.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json::to_vec_pretty(&value)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

fn deserialize_target_files<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, TargetFile>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut targets = BTreeMap::<String, TargetFile>::deserialize(deserializer)?;
    for (path, target) in targets.iter_mut() {
        target.path = path.clone();
    }
    Ok(targets)
}

mod expiration {
    use {
        chrono::{DateTime, NaiveDateTime, TimeZone as _, Utc},
        serde::{de, Deserialize, Deserializer, Serializer},
    };

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(expires: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&expires.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        let naive = NaiveDateTime::parse_from_str(&s, FORMAT).map_err(de::Error::custom)?;
        Ok(Utc.from_utc_datetime(&naive))
    }
}

/// Timestamp's `meta` map holds exactly one entry, for `snapshot.json`.
mod snapshot_meta {
    use {
        super::MetaFile,
        serde::{de, ser::SerializeMap, Deserialize, Deserializer, Serializer},
        std::collections::BTreeMap,
    };

    const SNAPSHOT_JSON: &str = "snapshot.json";

    pub fn serialize<S: Serializer>(meta: &MetaFile, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(1))?;
        map.serialize_entry(SNAPSHOT_JSON, meta)?;
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<MetaFile, D::Error> {
        let mut meta = BTreeMap::<String, MetaFile>::deserialize(d)?;
        meta.remove(SNAPSHOT_JSON).ok_or_else(|| de::Error::missing_field(SNAPSHOT_JSON))
    }
}

/// Delegated roles are stored by name but serialized as a list, which keeps their priority order.
mod ordered_roles {
    use {
        super::DelegatedRole,
        indexmap::IndexMap,
        serde::{Deserialize, Deserializer, Serializer},
    };

    pub fn serialize<S: Serializer>(
        roles: &IndexMap<String, DelegatedRole>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        s.collect_seq(roles.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<IndexMap<String, DelegatedRole>, D::Error> {
        let roles = Vec::<DelegatedRole>::deserialize(d)?;
        Ok(roles.into_iter().map(|role| (role.name.clone(), role)).collect())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        assert_matches::assert_matches,
        chrono::TimeZone as _,
        pretty_assertions::assert_eq,
        serde_json::json,
    };

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap()
    }

    fn delegated_role(name: &str) -> DelegatedRole {
        DelegatedRole {
            name: name.into(),
            keyids: vec![],
            threshold: 1,
            terminating: false,
            paths: Some(vec!["*".into()]),
            path_hash_prefixes: None,
        }
    }

    #[test]
    fn timestamp_wire_format() {
        let timestamp = Timestamp::new(3, expiry(), MetaFile::new(2));
        assert_eq!(
            serde_json::to_value(&timestamp).unwrap(),
            json!({
                "_type": "timestamp",
                "spec_version": SPEC_VERSION,
                "version": 3,
                "expires": "2030-01-02T03:04:05Z",
                "meta": { "snapshot.json": { "version": 2 } },
            })
        );
    }

    #[test]
    fn metafile_length_and_hashes_are_optional() {
        let mut meta = MetaFile::new(1);
        meta.length = Some(10);
        meta.hashes = Some(BTreeMap::from([("sha256".to_string(), "ab".to_string())]));
        assert_eq!(
            serde_json::to_value(&meta).unwrap(),
            json!({ "version": 1, "length": 10, "hashes": { "sha256": "ab" } })
        );
        assert_eq!(serde_json::to_value(&MetaFile::new(1)).unwrap(), json!({ "version": 1 }));
    }

    #[test]
    fn delegated_roles_serialize_in_insertion_order() {
        let mut targets = Targets::new(1, expiry());
        let mut delegations = Delegations::default();
        for name in ["zeta", "alpha", "mid"] {
            delegations.roles.insert(name.into(), delegated_role(name));
        }
        targets.delegations = Some(delegations);

        let value = serde_json::to_value(&targets).unwrap();
        let names: Vec<_> = value["delegations"]["roles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|role| role["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);

        let decoded: Targets = serde_json::from_value(value).unwrap();
        assert_eq!(
            decoded.delegations.unwrap().roles.keys().collect::<Vec<_>>(),
            ["zeta", "alpha", "mid"]
        );
    }

    #[test]
    fn target_paths_are_restored_when_decoding() {
        let mut targets = Targets::new(1, expiry());
        let file = TargetFile::from_data("a/b.txt", b"hello", &[HashAlgorithm::Sha256]);
        targets.targets.insert(file.path.clone(), file.clone());

        let value = serde_json::to_value(&targets).unwrap();
        assert_eq!(value["targets"]["a/b.txt"].get("path"), None);

        let decoded: Targets = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.targets["a/b.txt"], file);
    }

    #[test]
    fn root_add_and_revoke_key() {
        let mut root = Root::new(1, expiry(), true);
        let key = Key::ed25519(&[1; 32]);
        let key_id = key.key_id();

        root.add_key(TARGETS, key.clone()).unwrap();
        root.add_key(SNAPSHOT, key.clone()).unwrap();
        root.add_key(TARGETS, key).unwrap();
        assert_eq!(root.roles[TARGETS].keyids, vec![key_id.clone()]);

        root.revoke_key(TARGETS, &key_id).unwrap();
        assert!(root.roles[TARGETS].keyids.is_empty());
        assert!(root.keys.contains_key(&key_id));

        root.revoke_key(SNAPSHOT, &key_id).unwrap();
        assert!(root.keys.is_empty());

        assert_matches!(
            root.add_key("nope", Key::ed25519(&[2; 32])),
            Err(MetadataError::UnknownRole(role)) if role == "nope"
        );
    }

    #[test]
    fn targets_add_key_requires_a_delegation() {
        let mut targets = Targets::new(1, expiry());
        assert_matches!(
            targets.add_key("role1", Key::ed25519(&[1; 32])),
            Err(MetadataError::UnknownRole(_))
        );

        let mut delegations = Delegations::default();
        delegations.roles.insert("role1".into(), delegated_role("role1"));
        targets.delegations = Some(delegations);

        let key = Key::ed25519(&[1; 32]);
        targets.add_key("role1", key.clone()).unwrap();
        let delegations = targets.delegations.as_ref().unwrap();
        assert_eq!(delegations.roles["role1"].keyids, vec![key.key_id()]);
        assert_eq!(delegations.keys[&key.key_id()], key);
    }

    #[test]
    fn sign_replaces_signature_from_the_same_key() {
        let signer = Signer::generate().unwrap();
        let mut md = Signed::new(Targets::new(1, expiry()));

        md.sign(&signer).unwrap();
        md.signed.version = 2;
        md.sign(&signer).unwrap();

        assert_eq!(md.signatures.len(), 1);
        assert!(signer.key().verify(&md.canonical_signed().unwrap(), &md.signatures[0]));
    }

    #[test]
    fn envelope_round_trips_through_bytes() {
        let signer = Signer::generate().unwrap();
        let mut root = Root::new(1, expiry(), false);
        root.add_key(ROOT, signer.key().clone()).unwrap();
        let mut md = Signed::new(root);
        md.sign(&signer).unwrap();

        let decoded = Signed::<Root>::from_bytes(&md.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, md);
    }

    #[test]
    fn key_id_ignores_field_order() {
        let key = Key::ed25519(&[7; 32]);
        let canonical = crypto::canonicalize(&key).unwrap();
        assert_eq!(key.key_id().as_str(), HashAlgorithm::Sha256.hex_digest(&canonical));
    }
}
