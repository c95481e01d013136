//! Выбор способа запуска процессов-воркеров.
//!
//! `Fork` копирует образ родителя вместе с унаследованными блокировками,
//! дескрипторами и потоками. Если это поведение платформы по умолчанию,
//! до создания пула выбирается `ForkServer` (если есть) или `Spawn`.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMethod {
    /// Копия памяти родителя без exec
    Fork,
    /// Чистый процесс-сервер, от которого отпочковываются воркеры
    ForkServer,
    /// Новый образ процесса (exec)
    Spawn,
}

impl StartMethod {
    pub fn platform_default() -> Self {
        if cfg!(all(unix, not(target_os = "macos"))) {
            StartMethod::Fork
        } else {
            StartMethod::Spawn
        }
    }

    /// Способы, доступные на этой платформе.
    ///
    /// Форк-сервер с крейтом не поставляется, поэтому `ForkServer` здесь
    /// не появляется и `select` переходит сразу к `Spawn`.
    pub fn available() -> &'static [StartMethod] {
        if cfg!(unix) {
            &[StartMethod::Fork, StartMethod::Spawn]
        } else {
            &[StartMethod::Spawn]
        }
    }

    #[inline]
    pub fn is_safe(self) -> bool {
        !matches!(self, StartMethod::Fork)
    }

    /// Пул умеет запускать только свежий образ процесса
    #[inline]
    pub fn is_launchable(self) -> bool {
        matches!(self, StartMethod::Spawn)
    }
}

pub fn select(default: StartMethod, available: &[StartMethod]) -> StartMethod {
    if default.is_safe() {
        return default;
    }
    if available.contains(&StartMethod::ForkServer) {
        StartMethod::ForkServer
    } else {
        StartMethod::Spawn
    }
}

static RESOLVED: OnceLock<StartMethod> = OnceLock::new();

/// Проверка выполняется один раз за время жизни процесса
pub fn resolve() -> StartMethod {
    *RESOLVED.get_or_init(|| {
        let default = StartMethod::platform_default();
        let chosen = select(default, StartMethod::available());
        if chosen != default {
            tracing::debug!(?default, ?chosen, "switching away from unsafe start method");
        }
        chosen
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_default_prefers_fork_server() {
        let all = [StartMethod::Fork, StartMethod::ForkServer, StartMethod::Spawn];
        assert_eq!(select(StartMethod::Fork, &all), StartMethod::ForkServer);
    }

    #[test]
    fn fork_default_falls_back_to_spawn() {
        let available = [StartMethod::Fork, StartMethod::Spawn];
        assert_eq!(select(StartMethod::Fork, &available), StartMethod::Spawn);
    }

    #[test]
    fn safe_defaults_are_kept() {
        let all = [StartMethod::Fork, StartMethod::ForkServer, StartMethod::Spawn];
        assert_eq!(select(StartMethod::Spawn, &all), StartMethod::Spawn);
        assert_eq!(select(StartMethod::ForkServer, &all), StartMethod::ForkServer);
    }

    #[test]
    fn fork_server_is_never_offered() {
        assert!(!StartMethod::available().contains(&StartMethod::ForkServer));
        assert!(StartMethod::available().contains(&StartMethod::Spawn));
        assert_eq!(
            select(StartMethod::Fork, StartMethod::available()),
            StartMethod::Spawn
        );
    }

    #[test]
    fn resolved_method_is_stable_and_safe() {
        let first = resolve();
        assert!(first.is_safe());
        assert!(first.is_launchable());
        assert_eq!(resolve(), first);
    }
}
