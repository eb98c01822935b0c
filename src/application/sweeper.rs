use crate::application::service::{dispatch_notification, hold_context, report_restore};
use crate::application::ApplicationError;
use crate::domain::event::{HoldCancelled, ReservationEvent};
use crate::domain::model::CancelReason;
use crate::domain::port::{HoldLedger, HoldTransition, Logger, Notifier, TransitionOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

const COMPONENT: &str = "ExpirySweeper";

/// 1回のスイープの集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 期限切れとして取得したホールド数
    pub examined: u32,
    /// キャンセルし容量を返却したホールド数
    pub released: u32,
    /// 取得後に確定・キャンセルされていたため何もしなかったホールド数
    pub skipped: u32,
    /// ストレージエラーで処理できなかったホールド数（次回のスイープで再試行される）
    pub failed: u32,
}

/// 期限切れホールドのスイーパー
/// 一定間隔で期限切れのPendingホールドをキャンセルし、容量を返却する
pub struct ExpirySweeper {
    hold_ledger: Arc<dyn HoldLedger>,
    notifier: Arc<dyn Notifier>,
    logger: Arc<dyn Logger>,
    batch_size: u32,
}

impl ExpirySweeper {
    /// 新しいスイーパーを作成
    ///
    /// # Arguments
    /// * `hold_ledger` - ホールド台帳
    /// * `notifier` - 通知ポート
    /// * `logger` - ロガー
    /// * `batch_size` - 1回の取得件数の上限（0の場合は1として扱う）
    pub fn new(
        hold_ledger: Arc<dyn HoldLedger>,
        notifier: Arc<dyn Notifier>,
        logger: Arc<dyn Logger>,
        batch_size: u32,
    ) -> Self {
        Self {
            hold_ledger,
            notifier,
            logger,
            batch_size: batch_size.max(1),
        }
    }

    /// 期限切れのPendingホールドをすべて処理する
    ///
    /// ホールドごとに条件付き遷移（Pending → Cancelled）を発行するため、
    /// 同じ時刻で何度実行しても結果は変わらない。
    /// 1件の失敗は記録して残りの処理を続ける。
    ///
    /// # Returns
    /// * `Ok(SweepReport)` - 集計
    /// * `Err(ApplicationError)` - 期限切れホールドの取得自体に失敗
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, ApplicationError> {
        let mut report = SweepReport::default();

        loop {
            let batch = self
                .hold_ledger
                .find_expired_pending(now, self.batch_size)
                .await?;
            let fetched = batch.len() as u32;
            let failed_before = report.failed;

            for hold in batch {
                report.examined += 1;
                let transition = HoldTransition::Cancel {
                    at: now,
                    reason: CancelReason::Expired,
                };

                match self.hold_ledger.transition_pending(hold.id(), transition).await {
                    Ok(TransitionOutcome::Applied { hold, restore }) => {
                        report.released += 1;
                        let correlation_id = Uuid::new_v4();
                        if let Some(restore) = restore {
                            report_restore(
                                self.logger.as_ref(),
                                COMPONENT,
                                &hold,
                                &restore,
                                correlation_id,
                            );
                        }
                        dispatch_notification(
                            self.notifier.as_ref(),
                            self.logger.as_ref(),
                            COMPONENT,
                            ReservationEvent::HoldCancelled(HoldCancelled::from_hold(
                                &hold,
                                CancelReason::Expired,
                                correlation_id,
                            )),
                        )
                        .await;
                    }
                    // 確定・キャンセルとの競合に負けた
                    Ok(TransitionOutcome::NotPending { .. }) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        self.logger.error(
                            COMPONENT,
                            &format!("期限切れホールドの解放に失敗しました: {}", e),
                            None,
                            Some(hold_context(&hold)),
                        );
                    }
                }
            }

            // バッチが埋まっていて全件処理できた場合のみ次のバッチへ進む
            // 失敗したホールドは次回のスイープで再取得される
            if fetched < self.batch_size || report.failed > failed_before {
                break;
            }
        }

        if report.examined > 0 {
            let mut context = HashMap::new();
            context.insert("examined".to_string(), report.examined.to_string());
            context.insert("released".to_string(), report.released.to_string());
            context.insert("skipped".to_string(), report.skipped.to_string());
            context.insert("failed".to_string(), report.failed.to_string());
            self.logger.info(COMPONENT, "スイープが完了しました", None, Some(context));
        }

        Ok(report)
    }

    /// シャットダウン信号を受け取るまで一定間隔でスイープを実行する
    /// 前回のスイープが長引いた場合、取りこぼした周期は詰めずに飛ばす
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut context = HashMap::new();
        context.insert("interval_secs".to_string(), interval.as_secs().to_string());
        context.insert("batch_size".to_string(), self.batch_size.to_string());
        self.logger.info(COMPONENT, "スイーパーを開始しました", None, Some(context));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        self.logger.error(
                            COMPONENT,
                            &format!("スイープに失敗しました: {}", e),
                            None,
                            None,
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.logger.info(COMPONENT, "スイーパーを停止しました", None, None);
    }
}
