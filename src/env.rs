use std::{cell::RefCell, ffi::OsStr, time::Duration};

/// Keyboard poll timeout, if `LCVM_POLL_MS` is unset or invalid.
pub const DEFAULT_POLL_MS: u64 = 10;

#[derive(Clone, Copy)]
struct Env {
    minimal: bool,
    poll_timeout: Duration,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

/// Read settings from the environment. `minimal` forces minimal output regardless of
/// `LCVM_MINIMAL`.
pub fn init(minimal: bool) {
    let value = Env {
        minimal: minimal || var_is("LCVM_MINIMAL", "1"),
        poll_timeout: Duration::from_millis(poll_ms(std::env::var("LCVM_POLL_MS").ok())),
    };
    set_env(value);
}

/// Whether status messages should be suppressed.
pub fn is_minimal() -> bool {
    with_env(|env| env.minimal)
}

/// How long a keyboard status read may wait for a key.
pub fn poll_timeout() -> Duration {
    with_env(|env| env.poll_timeout)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: FnOnce(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}

fn poll_ms(value: Option<String>) -> u64 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_POLL_MS)
}
