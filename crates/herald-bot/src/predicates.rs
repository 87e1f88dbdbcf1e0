//! Event predicates: pure boolean filters that decide which handlers fire.
//!
//! Every predicate is side-effect free and answers `false` for events it
//! cannot make sense of instead of failing.

use std::sync::Arc;

use herald_core::error::{HeraldError, Result};
use herald_core::types::{Event, EventKind, EventSource, Membership, UserId};
use regex::{Regex, RegexBuilder};

type PredicateFn = dyn Fn(EventSource, &Event) -> bool + Send + Sync;

/// A named, shareable event filter.
#[derive(Clone)]
pub struct Predicate {
    name: String,
    f: Arc<PredicateFn>,
}

impl Predicate {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(EventSource, &Event) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn matches(&self, source: EventSource, event: &Event) -> bool {
        (self.f)(source, event)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Predicate").field(&self.name).finish()
    }
}

/// Evaluate a predicate set with short-circuit AND. Empty sets match everything.
pub fn matches_all(predicates: &[Predicate], source: EventSource, event: &Event) -> bool {
    predicates.iter().all(|p| p.matches(source, event))
}

/// Conjunction of several predicates.
pub fn all(predicates: Vec<Predicate>) -> Predicate {
    let name = format!(
        "all({})",
        predicates.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
    );
    Predicate::new(name, move |source, event| matches_all(&predicates, source, event))
}

/// Compile a case-insensitive pattern for [`message_matching`].
///
/// Anchoring is up to the caller: use `\A` for "body starts with".
pub fn pattern(expr: &str) -> Result<Regex> {
    RegexBuilder::new(expr)
        .case_insensitive(true)
        .build()
        .map_err(|e| HeraldError::Config(format!("Invalid pattern '{expr}': {e}")))
}

/// Message events whose body matches `regex`.
pub fn message_matching(regex: Regex) -> Predicate {
    Predicate::new(format!("message_matching({})", regex.as_str()), move |_, event| {
        event.is_message() && regex.is_match(&event.body)
    })
}

/// Message events addressed to `user`: the trimmed body starts with the
/// user's local part, optionally written as an `@` mention.
pub fn at_user(user: &UserId) -> Predicate {
    let localpart = user.localpart().to_string();
    Predicate::new(format!("at_user({user})"), move |_, event| {
        if !event.is_message() || localpart.is_empty() {
            return false;
        }
        let body = event.body.trim();
        let body = body.strip_prefix('@').unwrap_or(body);
        body.starts_with(localpart.as_str())
    })
}

/// Events not sent by `user`.
pub fn not_from_user(user: &UserId) -> Predicate {
    let user = user.clone();
    Predicate::new(format!("not_from_user({user})"), move |_, event| {
        event.sender != user
    })
}

/// Membership events inviting someone into a room.
pub fn invited_to_room() -> Predicate {
    Predicate::new("invited_to_room", |_, event| {
        event.kind == EventKind::Membership(Membership::Invite)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn msg(body: &str) -> Event {
        Event::message("$1", "!room:example.org", "@alice:example.org", body)
    }

    fn constant(value: bool) -> Predicate {
        Predicate::new(format!("const({value})"), move |_, _| value)
    }

    #[test]
    fn test_message_matching() {
        let p = message_matching(pattern(r"\A\s*remind\s+me").unwrap());
        assert!(p.matches(EventSource::Timeline, &msg("Remind me tomorrow")));
        assert!(p.matches(EventSource::Timeline, &msg("  REMIND me")));
        assert!(!p.matches(EventSource::Timeline, &msg("please remind me")));

        let invite = Event::membership("$2", "!r:x", "@a:x", Membership::Invite);
        assert!(!p.matches(EventSource::State, &invite));

        let typing = msg("remind me").with_kind(EventKind::Typing);
        assert!(!typing.is_message());
        assert!(!p.matches(EventSource::Ephemeral, &typing));
    }

    #[test]
    fn test_at_user() {
        let p = at_user(&UserId::from("@herald:example.org"));
        assert!(p.matches(EventSource::Timeline, &msg("herald: status")));
        assert!(p.matches(EventSource::Timeline, &msg("  @herald status")));
        assert!(!p.matches(EventSource::Timeline, &msg("status herald")));
        assert!(!p.matches(EventSource::Timeline, &msg("")));
        let typing = msg("herald: status").with_kind(EventKind::Typing);
        assert!(!p.matches(EventSource::Ephemeral, &typing));
    }

    #[test]
    fn test_not_from_user() {
        let p = not_from_user(&UserId::from("@alice:example.org"));
        assert!(!p.matches(EventSource::Timeline, &msg("hi")));
        let p = not_from_user(&UserId::from("@bob:example.org"));
        assert!(p.matches(EventSource::Timeline, &msg("hi")));
    }

    #[test]
    fn test_invited_to_room() {
        let p = invited_to_room();
        let invite = Event::membership("$2", "!r:x", "@a:x", Membership::Invite);
        let join = Event::membership("$3", "!r:x", "@a:x", Membership::Join);
        assert!(p.matches(EventSource::Invite, &invite));
        assert!(!p.matches(EventSource::State, &join));
        assert!(!p.matches(EventSource::Timeline, &msg("invite")));
    }

    #[test]
    fn test_empty_all_is_true() {
        assert!(all(vec![]).matches(EventSource::Timeline, &msg("anything")));
        assert!(matches_all(&[], EventSource::Ephemeral, &msg("")));
    }

    #[test]
    fn test_all_short_circuits() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = {
            let calls = calls.clone();
            Predicate::new("counted", move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            })
        };
        let p = all(vec![constant(false), counted]);
        assert!(!p.matches(EventSource::Timeline, &msg("x")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(pattern("(unclosed"), Err(HeraldError::Config(_))));
    }

    proptest! {
        #[test]
        fn property_all_is_conjunction(outcomes in proptest::collection::vec(any::<bool>(), 0..12)) {
            let predicates: Vec<Predicate> = outcomes.iter().copied().map(constant).collect();
            let expected = outcomes.iter().all(|b| *b);
            prop_assert_eq!(all(predicates.clone()).matches(EventSource::Timeline, &msg("x")), expected);
            prop_assert_eq!(matches_all(&predicates, EventSource::Timeline, &msg("x")), expected);
        }

        #[test]
        fn property_message_matching_never_panics(body in any::<String>()) {
            let p = all(vec![
                message_matching(pattern(r"\A\s*status").unwrap()),
                at_user(&UserId::from("@herald:example.org")),
            ]);
            let _ = p.matches(EventSource::Timeline, &msg(&body));
        }
    }
}
