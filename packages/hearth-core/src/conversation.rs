//! # Conversation Keys
//!
//! A conversation is not stored anywhere. It is the set of messages sharing a
//! key derived from the two participants and the listing they are talking
//! about:
//!
//! ```text
//! resolve("u2", "u1", "h1")
//!     sort ["u2", "u1"]  →  ["u1", "u2"]
//!     join with "_"      →  "u1_u2"
//!     append listing     →  "u1_u2_h1"
//! ```
//!
//! Sorting is plain lexicographic string order, so `"10" < "9"`. Both
//! participants derive the same key no matter who writes first, which caps a
//! user pair at one conversation per listing.

/// Derive the canonical conversation key for a user pair and a listing.
pub fn resolve(user_a: &str, user_b: &str, listing_id: &str) -> String {
    let (first, second) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{}_{}_{}", first, second, listing_id)
}

/// Whether `user_id` appears as one of the two participant segments of a key.
///
/// Keys are not parsed back into ids, since ids may themselves contain `_`.
/// This can match a key the user is not part of but never misses one they are.
pub fn names_participant(key: &str, user_id: &str) -> bool {
    !user_id.is_empty()
        && (key.starts_with(&format!("{}_", user_id)) || key.contains(&format!("_{}_", user_id)))
}

/// Given one endpoint of a message, return the other one.
pub fn other_participant<'a>(me: &str, sender_id: &'a str, receiver_id: &'a str) -> &'a str {
    if sender_id == me {
        receiver_id
    } else {
        sender_id
    }
}

/// Personal room name for direct notifications to a user.
pub fn personal_room(user_id: &str) -> String {
    format!("user_{}", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_symmetric() {
        let pairs = [
            ("u1", "u2"),
            ("64f1a2", "64f0ff"),
            ("alice", "Bob"),
            ("10", "9"),
            ("same", "same"),
        ];
        for (a, b) in pairs {
            assert_eq!(resolve(a, b, "h1"), resolve(b, a, "h1"));
        }
    }

    #[test]
    fn test_resolve_sorts_lexicographically() {
        assert_eq!(resolve("u2", "u1", "h1"), "u1_u2_h1");
        // String order, not numeric order
        assert_eq!(resolve("9", "10", "h1"), "10_9_h1");
    }

    #[test]
    fn test_distinct_listings_give_distinct_keys() {
        assert_ne!(resolve("u1", "u2", "h1"), resolve("u1", "u2", "h2"));
    }

    #[test]
    fn test_names_participant() {
        let key = resolve("guest", "host", "home1");
        assert!(names_participant(&key, "guest"));
        assert!(names_participant(&key, "host"));
        assert!(!names_participant(&key, "home1"));
        assert!(!names_participant(&key, "gue"));
        assert!(!names_participant(&key, ""));
    }

    #[test]
    fn test_other_participant() {
        assert_eq!(other_participant("u1", "u1", "u2"), "u2");
        assert_eq!(other_participant("u1", "u2", "u1"), "u2");
    }

    #[test]
    fn test_personal_room() {
        assert_eq!(personal_room("u1"), "user_u1");
    }
}
