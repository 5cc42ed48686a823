//! Tests for the get and config subcommands.

use super::parse;
use crate::cli::commands::parse_header;
use crate::cli::{Cli, CliCommand, GetArgs};
use clap::Parser;
use imgfetch_core::config::{ExecutionOrder, FetcherConfig};
use imgfetch_core::FetchOptions;
use std::time::Duration;

fn get_args(args: &[&str]) -> GetArgs {
    match parse(args) {
        CliCommand::Get(args) => args,
        other => panic!("expected Get, got {other:?}"),
    }
}

#[test]
fn cli_parse_get_defaults() {
    let args = get_args(&["imgfetch", "get", "https://example.com/a.png"]);
    assert_eq!(args.urls, vec!["https://example.com/a.png"]);
    assert!(args.jobs.is_none());
    assert!(!args.lifo);
    assert!(args.timeout.is_none());
    assert!(args.headers.is_empty());
    assert_eq!(args.options(), FetchOptions::NONE);
}

#[test]
fn cli_parse_get_flags() {
    let args = get_args(&[
        "imgfetch",
        "get",
        "https://example.com/a.png",
        "https://example.com/b.png",
        "--jobs",
        "3",
        "--lifo",
        "--timeout",
        "2.5",
        "--header",
        "Referer: https://example.com",
        "--header",
        "X-Client:cli",
        "--progressive",
        "--high-priority",
        "--scale-down",
        "--cookies",
    ]);
    assert_eq!(args.urls.len(), 2);
    assert_eq!(args.jobs, Some(3));
    assert!(args.lifo);
    assert_eq!(args.headers.len(), 2);
    let options = args.options();
    assert!(options.contains(FetchOptions::PROGRESSIVE));
    assert!(options.contains(FetchOptions::HIGH_PRIORITY));
    assert!(options.contains(FetchOptions::SCALE_DOWN_LARGE_RESULT));
    assert!(options.contains(FetchOptions::HANDLE_COOKIES));
    assert!(!options.contains(FetchOptions::ALLOW_INSECURE_TRANSPORT));
    assert!(!options.contains(FetchOptions::LOW_PRIORITY));

    let settings = args.settings(&FetcherConfig::default()).unwrap();
    assert_eq!(settings.max_concurrent_downloads, 3);
    assert_eq!(settings.execution_order, ExecutionOrder::Lifo);
    assert_eq!(settings.download_timeout, Duration::from_millis(2500));
    assert_eq!(settings.headers.get("referer"), Some("https://example.com"));
    assert_eq!(settings.headers.get("X-Client"), Some("cli"));
    assert!(settings.headers.get("Accept").is_some());
}

#[test]
fn cli_get_requires_a_url() {
    assert!(Cli::try_parse_from(["imgfetch", "get"]).is_err());
}

#[test]
fn cli_get_priority_flags_conflict() {
    assert!(Cli::try_parse_from([
        "imgfetch",
        "get",
        "https://example.com/a.png",
        "--high-priority",
        "--low-priority",
    ])
    .is_err());
}

#[test]
fn cli_get_user_needs_password() {
    assert!(Cli::try_parse_from(["imgfetch", "get", "https://x/a", "--user", "me"]).is_err());
    let args = get_args(&[
        "imgfetch",
        "get",
        "https://x/a",
        "--user",
        "me",
        "--password",
        "pw",
    ]);
    let settings = args.settings(&FetcherConfig::default()).unwrap();
    let cred = settings.effective_credential().unwrap();
    assert_eq!((cred.user.as_str(), cred.password.as_str()), ("me", "pw"));
}

#[test]
fn cli_get_rejects_bad_timeout() {
    let args = get_args(&["imgfetch", "get", "https://x/a", "--timeout=-1"]);
    assert!(args.settings(&FetcherConfig::default()).is_err());
}

#[test]
fn header_parsing() {
    assert_eq!(parse_header("Accept: image/png").unwrap(), ("Accept", "image/png"));
    assert_eq!(parse_header("X-Empty:").unwrap(), ("X-Empty", ""));
    assert!(parse_header("no colon").is_err());
    assert!(parse_header(": value").is_err());
    assert!(parse_header("Bad Name: v").is_err());
}

#[test]
fn cli_parse_config() {
    assert!(matches!(parse(&["imgfetch", "config"]), CliCommand::Config));
}
