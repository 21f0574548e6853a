//! Per-channel retry/backoff policy. Delay, cap, and retry ceiling are
//! per-channel here, decided once from the notification's channel rather than
//! a single global rule.

use nh_common::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffType {
    Exponential,
    Fixed,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub backoff_type: BackoffType,
    pub backoff_delay_ms: u64,
    pub max_backoff_delay_ms: Option<u64>,
}

/// Default per-channel policy table (§4.5).
pub fn policy_for(channel: Channel) -> RetryPolicy {
    match channel {
        Channel::Email => RetryPolicy {
            max_retries: 5,
            backoff_type: BackoffType::Exponential,
            backoff_delay_ms: 2_000,
            max_backoff_delay_ms: Some(300_000),
        },
        Channel::Sms => RetryPolicy {
            max_retries: 3,
            backoff_type: BackoffType::Exponential,
            backoff_delay_ms: 5_000,
            max_backoff_delay_ms: Some(600_000),
        },
        Channel::Push => RetryPolicy {
            max_retries: 4,
            backoff_type: BackoffType::Exponential,
            backoff_delay_ms: 1_000,
            max_backoff_delay_ms: Some(120_000),
        },
        Channel::Slack => RetryPolicy {
            max_retries: 3,
            backoff_type: BackoffType::Fixed,
            backoff_delay_ms: 10_000,
            max_backoff_delay_ms: None,
        },
        Channel::Telegram => RetryPolicy {
            max_retries: 3,
            backoff_type: BackoffType::Fixed,
            backoff_delay_ms: 10_000,
            max_backoff_delay_ms: None,
        },
    }
}

/// Delay before retry attempt `attempt` (1-indexed among retries, i.e. the value
/// `increment_retry_count` just returned). Exponential backoff doubles per
/// attempt from `backoff_delay_ms`, capped at `max_backoff_delay_ms` (defaulting
/// to 10x the base when the channel sets no explicit cap); fixed backoff never
/// varies. The cap is hard — no delay this function returns ever exceeds it.
pub fn next_delay_ms(policy: &RetryPolicy, attempt: i32) -> u64 {
    match policy.backoff_type {
        BackoffType::Fixed => policy.backoff_delay_ms,
        BackoffType::Exponential => {
            let cap = policy.max_backoff_delay_ms.unwrap_or(policy.backoff_delay_ms * 10);
            let exponent = (attempt - 1).max(0) as u32;
            let raw = policy.backoff_delay_ms.saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX).max(1));
            raw.min(cap)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_backoff_doubles_and_caps() {
        let policy = policy_for(Channel::Email);
        assert_eq!(next_delay_ms(&policy, 1), 2_000);
        assert_eq!(next_delay_ms(&policy, 2), 4_000);
        assert_eq!(next_delay_ms(&policy, 3), 8_000);
        // attempt 8 would be 2000*2^7=256000, attempt 9 would exceed the 300000 cap
        assert_eq!(next_delay_ms(&policy, 20), 300_000);
    }

    #[test]
    fn slack_backoff_is_fixed() {
        let policy = policy_for(Channel::Slack);
        assert_eq!(next_delay_ms(&policy, 1), 10_000);
        assert_eq!(next_delay_ms(&policy, 5), 10_000);
    }

    #[test]
    fn push_backoff_within_spec_bounds() {
        // §8 scenario 4: exhausted retries, final delay <= 120_000ms
        let policy = policy_for(Channel::Push);
        assert_eq!(policy.max_retries, 4);
        for attempt in 1..=policy.max_retries {
            assert!(next_delay_ms(&policy, attempt) <= 120_000);
        }
    }

    #[test]
    fn email_transient_retry_delay_within_spec_bounds() {
        // §8 scenario 2: observed retry delay in [2_000ms, 300_000ms]
        let policy = policy_for(Channel::Email);
        let delay = next_delay_ms(&policy, 1);
        assert!((2_000..=300_000).contains(&delay));
    }
}
