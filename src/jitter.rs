use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Окно по умолчанию: сон в диапазоне [0, 0.0001) секунды
pub const DEFAULT_WINDOW: Duration = Duration::from_micros(100);

/// Случайная задержка, имитирующая переменную латентность работы
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Jitter {
    pub window: Duration,
}

impl Default for Jitter {
    fn default() -> Self {
        Self { window: DEFAULT_WINDOW }
    }
}

impl Jitter {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_nanos(window_nanos: u64) -> Self {
        Self::new(Duration::from_nanos(window_nanos))
    }

    #[inline]
    pub fn window_nanos(&self) -> u64 {
        u64::try_from(self.window.as_nanos()).unwrap_or(u64::MAX)
    }

    /// Равномерная выборка из [0, window)
    pub fn sample(&self) -> Duration {
        let window = self.window_nanos();
        if window == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(0..window))
    }

    #[inline]
    pub fn contains(&self, d: Duration) -> bool {
        d < self.window || (self.window.is_zero() && d.is_zero())
    }

    /// Блокирующий сон текущего потока, возвращает выбранную задержку
    pub fn sleep_blocking(&self) -> Duration {
        let wait = self.sample();
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_inside_window() {
        let jitter = Jitter::default();
        for _ in 0..10_000 {
            let d = jitter.sample();
            assert!(d < DEFAULT_WINDOW, "{:?} out of window", d);
            assert!(jitter.contains(d));
        }
    }

    #[test]
    fn zero_window_never_sleeps() {
        let jitter = Jitter::new(Duration::ZERO);
        assert_eq!(jitter.sample(), Duration::ZERO);
        assert_eq!(jitter.sleep_blocking(), Duration::ZERO);
        assert!(jitter.contains(Duration::ZERO));
        assert!(!jitter.contains(Duration::from_nanos(1)));
    }

    #[test]
    fn window_is_exclusive() {
        let jitter = Jitter::from_nanos(1);
        assert_eq!(jitter.sample(), Duration::ZERO);
        assert!(!jitter.contains(Duration::from_nanos(1)));
    }
}
