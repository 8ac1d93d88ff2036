//! Address pattern tests

use osc_core::pattern::{intersects, Pattern, Token};
use osc_core::{Address, Error};
use proptest::prelude::*;
use std::time::{Duration, Instant};

#[test]
fn test_documented_cases() {
    assert!(intersects("/foo/*", "/foo/bar").unwrap());
    assert!(!intersects("/foo/?", "/foo/barbaz").unwrap());
    assert!(intersects("/a/{x,y}", "/a/y").unwrap());
    assert!(!intersects("/a/{x,y}", "/a/z").unwrap());
    assert!(!intersects("/foo/[!abc]", "/foo/a").unwrap());
    assert!(intersects("/foo/[!abc]", "/foo/z").unwrap());
}

#[test]
fn test_pattern_vs_pattern() {
    assert!(intersects("/synth/*/freq", "/synth/1?/*").unwrap());
    assert!(!intersects("/synth/*/freq", "/mixer/*/freq").unwrap());
    assert!(intersects("/{synth,mixer}/[0-3]", "/mixer/?").unwrap());
    assert!(!intersects("/{synth,mixer}/[0-3]", "/mixer/[4-7]").unwrap());
}

#[test]
fn test_star_does_not_cross_separator() {
    assert!(!intersects("/*", "/a/b").unwrap());
    assert!(intersects("/*/b", "/a/b").unwrap());
}

#[test]
fn test_literal_address_tokens() {
    let address = Address::parse("/track/1/volume").unwrap();
    let pattern = Pattern::compile(address.as_str()).unwrap();
    assert!(pattern.is_literal());
    assert!(pattern.tokens().iter().all(|t| matches!(t, Token::Char(_))));
    assert!(address.matches(&pattern));
}

#[test]
fn test_class_tokens() {
    let pattern = Pattern::compile("/[!a-c]").unwrap();
    assert_eq!(
        pattern.tokens()[1],
        Token::Class {
            negated: true,
            ranges: vec![('a', 'c')]
        }
    );
}

#[test]
fn test_invalid_pattern_error() {
    assert!(matches!(
        intersects("/a/{b", "/a/b"),
        Err(Error::InvalidPattern(_))
    ));
    assert!(matches!(
        "/x/[y".parse::<Pattern>(),
        Err(Error::InvalidPattern(_))
    ));
}

#[test]
fn test_long_address_matches_in_linear_time() {
    let address = format!("/{}", "a".repeat(10_000));
    let started = Instant::now();

    assert!(Pattern::compile("/*").unwrap().matches(&address));
    assert!(Pattern::compile("/*a*a*").unwrap().matches(&address));
    assert!(!Pattern::compile("/*b").unwrap().matches(&address));
    assert!(!Pattern::compile("/*/*").unwrap().matches(&address));
    assert!(intersects(&address, "/{x,a*}").unwrap());

    assert!(
        started.elapsed() < Duration::from_secs(2),
        "matching took {:?}",
        started.elapsed()
    );
}

#[test]
fn test_class_without_members_is_invalid() {
    for bad in ["/a[]b", "/a[/]b"] {
        assert!(matches!(
            Pattern::compile(bad),
            Err(Error::InvalidPattern(_))
        ));
    }
}

fn arb_part() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-d]".prop_map(|s| s),
        Just("*".to_string()),
        Just("?".to_string()),
        Just("[!ab]".to_string()),
        Just("[b-d]".to_string()),
        Just("{a,bc}".to_string()),
        Just("{,d*}".to_string()),
        Just("/".to_string()),
    ]
}

fn arb_pattern() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_part(), 0..8).prop_map(|parts| format!("/{}", parts.concat()))
}

proptest! {
    #[test]
    fn prop_reflexive(p in arb_pattern()) {
        prop_assert!(intersects(&p, &p).unwrap());
    }

    #[test]
    fn prop_symmetric(a in arb_pattern(), b in arb_pattern()) {
        prop_assert_eq!(intersects(&a, &b).unwrap(), intersects(&b, &a).unwrap());
    }

    #[test]
    fn prop_literal_matches_only_itself(a in "/[a-z]{1,6}(/[a-z]{1,6}){0,2}", b in "/[a-z]{1,6}(/[a-z]{1,6}){0,2}") {
        prop_assert_eq!(Pattern::compile(&a).unwrap().matches(&b), a == b);
    }
}
