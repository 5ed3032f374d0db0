//! Routing-key grammar and AMQP-style topic pattern matching (§6).
//!
//! - `cmd.{role}.{id|any}` — commands to agents/services.
//! - `evt.{topic}.{event_type}` — fire-and-forget events.
//! - `ctl.{target}.{control_type}` — operator controls.
//!
//! Patterns use the AMQP topic-exchange grammar: `*` matches exactly one
//! dot-separated segment, `#` matches zero or more segments.

/// Build the routing key for a command targeting a role and a specific node id
/// (or the literal `any` to mean "whichever node claims this role first").
pub fn command_key(role: &str, target: &str) -> String {
    format!("cmd.{role}.{target}")
}

/// Build the routing key for an event under `topic` with the given suffix.
pub fn event_key(topic: &str, suffix: &str) -> String {
    format!("evt.{topic}.{suffix}")
}

/// Build the routing key for a control message.
pub fn control_key(target: &str, control_type: &str) -> String {
    format!("ctl.{target}.{control_type}")
}

/// Whether `routing_key` matches `pattern` under the AMQP topic-exchange grammar.
pub fn matches(pattern: &str, routing_key: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let key_segments: Vec<&str> = routing_key.split('.').collect();
    matches_segments(&pattern_segments, &key_segments)
}

fn matches_segments(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.first() {
        None => key.is_empty(),
        Some(&"#") => {
            if pattern.len() == 1 {
                return true;
            }
            // '#' may absorb zero or more segments; try every split point.
            (0..=key.len()).any(|i| matches_segments(&pattern[1..], &key[i..]))
        }
        Some(&"*") => !key.is_empty() && matches_segments(&pattern[1..], &key[1..]),
        Some(&literal) => {
            !key.is_empty() && key[0] == literal && matches_segments(&pattern[1..], &key[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_command_key() {
        assert_eq!(command_key("writer", "writer-1"), "cmd.writer.writer-1");
        assert_eq!(command_key("writer", "any"), "cmd.writer.any");
    }

    #[test]
    fn builds_event_key() {
        assert_eq!(event_key("node", "registered"), "evt.node.registered");
    }

    #[test]
    fn star_matches_exactly_one_segment() {
        assert!(matches("cmd.*.any", "cmd.writer.any"));
        assert!(!matches("cmd.*.any", "cmd.writer.extra.any"));
        assert!(!matches("cmd.*.any", "cmd.any"));
    }

    #[test]
    fn hash_matches_zero_or_more_segments() {
        assert!(matches("evt.node.#", "evt.node.registered"));
        assert!(matches("evt.node.#", "evt.node.heartbeat.missed"));
        assert!(matches("evt.#", "evt.node.registered"));
        assert!(matches("evt.node.#", "evt.node"));
    }

    #[test]
    fn exact_literal_must_match() {
        assert!(matches("cmd.writer.writer-1", "cmd.writer.writer-1"));
        assert!(!matches("cmd.writer.writer-1", "cmd.writer.writer-2"));
    }

    #[test]
    fn mismatched_segment_count_without_wildcard_fails() {
        assert!(!matches("cmd.writer.any", "cmd.writer"));
    }
}
