use crate::application::ApplicationError;
use crate::domain::model::ActorId;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter as KeyedLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// アクターごとのレート制限
///
/// プロセス全体で1つのインスタンスをmainで作成し、HTTP層の状態として共有する。
/// ウィンドウあたり `max_requests` 件までを即時に受け付け、以降は
/// `window / max_requests` ごとに1件ずつ回復する。
/// 上限まで回復したアクターのエントリは定期的な掃除で破棄される。
pub struct RateLimiter<C: Clock = DefaultClock> {
    limiter: KeyedLimiter<ActorId, DashMapStateStore<ActorId>, C, NoOpMiddleware<C::Instant>>,
    clock: C,
    window: Duration,
}

impl RateLimiter<DefaultClock> {
    /// 新しいレート制限を作成
    ///
    /// # Arguments
    /// * `max_requests` - ウィンドウあたりの最大リクエスト数
    /// * `window` - ウィンドウの長さ
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_clock(max_requests, window, DefaultClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(max_requests: u32, window: Duration, clock: C) -> Self {
        let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
        let period = (window / burst.get()).max(Duration::from_nanos(1));
        let quota = Quota::with_period(period)
            .map(|quota| quota.allow_burst(burst))
            .unwrap_or_else(|| Quota::per_second(burst));

        Self {
            limiter: KeyedLimiter::dashmap_with_clock(quota, &clock),
            clock,
            window,
        }
    }

    /// リクエストを1件記録し、上限を超えていればエラーを返す
    pub fn check(&self, actor: ActorId) -> Result<(), ApplicationError> {
        self.limiter.check_key(&actor).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            ApplicationError::RateLimited {
                retry_after_secs: secs.max(1),
            }
        })
    }

    /// 上限まで回復したエントリを破棄し、残った件数を返す
    pub fn evict_recovered(&self) -> usize {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        self.limiter.len()
    }

    /// 追跡中のアクター数
    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }
}

impl<C> RateLimiter<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// シャットダウン信号を受け取るまでウィンドウ長ごとに掃除する
    pub async fn run_eviction(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.window.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tracked = self.evict_recovered();
                    tracing::debug!(tracked, "rate limit entries evicted");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
