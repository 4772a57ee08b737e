use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub fn uuid_v7_without_dashes() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// Order-independent key for a pair of ids. The first id is length-prefixed
/// so ids containing the separator cannot collide.
pub fn pair_key(user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{}:{first}:{second}", first.len())
}

/// Hex sha256 of `bytes`, used as a content-addressed object key.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Inserts `value` unless already present. Returns whether the list changed.
pub fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|item| item == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

/// Removes every occurrence of `value`. Returns whether the list changed.
pub fn pull_all(list: &mut Vec<String>, value: &str) -> bool {
    let before = list.len();
    list.retain(|item| item != value);
    before != list.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_unique_keeps_set_semantics() {
        let mut list = vec!["a".to_string()];
        assert!(!push_unique(&mut list, "a"));
        assert!(push_unique(&mut list, "b"));
        assert_eq!(list, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn pull_all_removes_duplicates() {
        let mut list = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert!(pull_all(&mut list, "a"));
        assert_eq!(list, vec!["b".to_string()]);
        assert!(!pull_all(&mut list, "a"));
    }

    #[test]
    fn content_digest_is_stable() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn pair_key_is_unambiguous_for_separator_ids() {
        assert_eq!(pair_key("bob", "alice"), pair_key("alice", "bob"));
        assert_eq!(pair_key("alice", "bob"), "5:alice:bob");
        assert_ne!(pair_key("a:1", "c"), pair_key("a", "1:c"));
        assert_ne!(pair_key("a__b", "c"), pair_key("a", "b__c"));
    }
}
