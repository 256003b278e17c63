//! notify.rs
//!
//! Клиент внешнего диспетчера уведомлений. Уведомление — побочный эффект
//! после коммита: отправляется в фоне через `tokio::spawn`, ошибки пишутся
//! в лог и никогда не влияют на результат самой операции бронирования.
//!
//! Сетевые вызовы защищены "автоматическим выключателем": после серии
//! сбоев запросы к диспетчеру на время прекращаются, чтобы не тратить
//! время обработчиков на заведомо мёртвый сервис.

use serde_json::json;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::NotifierConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Нормальный режим, запросы разрешены.
    Closed,
    /// Диспетчер считается недоступным, запросы блокируются до конца паузы.
    Open,
    /// Пауза истекла, разрешён один пробный запрос.
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                opened_at: None,
            }),
            failure_threshold,
            cooldown,
        }
    }

    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    info!("notifier circuit breaker transitioning to HalfOpen");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::HalfOpen {
            info!("notifier circuit breaker recovered, closing");
        }
        inner.state = BreakerState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        failures = inner.failures,
                        "notifier circuit breaker OPENED"
                    );
                }
            }
            BreakerState::HalfOpen => {
                // Пробный запрос провалился, возвращаемся в паузу
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }
}

pub struct Notifier {
    http: reqwest::Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl Notifier {
    pub fn from_config(config: &NotifierConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("failed to build notifier http client");

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            breaker: CircuitBreaker::new(
                config.failure_threshold,
                Duration::from_secs(config.cooldown_seconds),
            ),
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Подтверждение брони. Вызывается после коммита транзакции леджера.
    pub async fn send_booking_confirmation(&self, booking_id: i64, message: &str) {
        let body = json!({
            "request_id": Uuid::new_v4(),
            "booking_id": booking_id,
            "message": message,
        });
        self.post("/notifications/bookings", body).await;
    }

    /// Рассылка об изменении события всем забронировавшим.
    pub async fn send_event_update(&self, event_id: i64, message: &str) {
        let body = json!({
            "request_id": Uuid::new_v4(),
            "event_id": event_id,
            "message": message,
        });
        self.post("/notifications/events", body).await;
    }

    async fn post(&self, path: &str, body: serde_json::Value) {
        if !self.breaker.can_execute() {
            warn!(path, "notification skipped: circuit breaker is open");
            return;
        }

        match self.try_post(path, &body).await {
            Ok(()) => self.breaker.record_success(),
            Err(e) => {
                self.breaker.record_failure();
                // Best-effort: бронь уже закоммичена, наружу ошибку не отдаём
                warn!(path, error = %e, "notification dispatch failed");
            }
        }
    }

    async fn try_post(&self, path: &str, body: &serde_json::Value) -> anyhow::Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).json(body).send().await?;
        response.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn breaker_half_opens_after_cooldown_and_recovers() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(0));

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        // Нулевая пауза: следующий вызов сразу даёт пробный запрос
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn failed_probe_reopens_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(0));

        breaker.record_failure();
        assert!(breaker.can_execute()); // HalfOpen
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
