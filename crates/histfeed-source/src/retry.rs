//! 원격 수집 재시도 정책.
//!
//! 일시적 오류에 대한 지수 백오프 계산을 제공합니다. 재시도 여부의
//! 판단은 `SourceError::is_retryable()`이, 대기 시간의 계산은 이 모듈이
//! 담당합니다.

use rand::Rng;
use std::time::Duration;

/// 재시도 정책.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (최초 시도 포함)
    pub max_attempts: u32,
    /// 초기 백오프
    pub initial_backoff: Duration,
    /// 최대 백오프
    pub max_backoff: Duration,
    /// 백오프 배수
    pub backoff_multiplier: f64,
    /// 지터 계수 (0.0 ~ 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// 빠르게 자주 재시도하는 정책.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 1.5,
            jitter_factor: 0.1,
        }
    }

    /// 천천히 적게 재시도하는 정책.
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 3.0,
            jitter_factor: 0.3,
        }
    }

    /// 재시도 없이 한 번만 시도하는 정책.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// 지수 백오프 계산기.
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    policy: RetryPolicy,
}

impl BackoffCalculator {
    /// 주어진 정책으로 계산기를 생성합니다.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// 적용된 정책을 반환합니다.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 다음 재시도까지의 대기 시간을 반환합니다.
    ///
    /// `attempt`는 0부터 시작하는 실패한 시도의 번호입니다.
    /// 시도 횟수를 소진했으면 `None`을 반환합니다.
    pub fn next_backoff(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.policy.max_attempts {
            return None;
        }

        let base = self.policy.initial_backoff.as_millis() as f64
            * self.policy.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.policy.max_backoff.as_millis() as f64);

        Some(Duration::from_millis(self.apply_jitter(capped) as u64))
    }

    /// 백오프에 ±jitter_factor 범위의 무작위 편차를 더합니다.
    fn apply_jitter(&self, backoff_ms: f64) -> f64 {
        if self.policy.jitter_factor <= 0.0 {
            return backoff_ms;
        }

        let jitter_range = backoff_ms * self.policy.jitter_factor;
        let min = (backoff_ms - jitter_range).max(0.0);
        let max = backoff_ms + jitter_range;
        rand::thread_rng().gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic(policy: RetryPolicy) -> BackoffCalculator {
        BackoffCalculator::new(RetryPolicy {
            jitter_factor: 0.0,
            ..policy
        })
    }

    #[test]
    fn test_backoff_sequence() {
        let calc = deterministic(RetryPolicy::default());

        assert_eq!(calc.next_backoff(0), Some(Duration::from_millis(100)));
        assert_eq!(calc.next_backoff(1), Some(Duration::from_millis(200)));
        assert_eq!(calc.next_backoff(2), None);
    }

    #[test]
    fn test_backoff_capped() {
        let calc = deterministic(RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(15),
            backoff_multiplier: 10.0,
            jitter_factor: 0.0,
        });

        assert_eq!(calc.next_backoff(1), Some(Duration::from_secs(15)));
        assert_eq!(calc.next_backoff(5), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_backoff_exhausted_immediately() {
        let calc = deterministic(RetryPolicy::no_retry());
        assert_eq!(calc.next_backoff(0), None);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let calc = BackoffCalculator::new(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 1.0,
            jitter_factor: 0.5,
        });

        for _ in 0..100 {
            let backoff = calc.next_backoff(0).unwrap();
            assert!(backoff >= Duration::from_millis(50));
            assert!(backoff <= Duration::from_millis(150));
        }
    }
}
