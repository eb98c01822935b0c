use crate::domain::port::Logger;
use std::collections::HashMap;
use uuid::Uuid;

/// tracingロガー
/// Loggerポートの呼び出しをtracingのイベントへ変換する
/// 出力先・フィルタはmainで設定するtracing-subscriberに従う
#[derive(Debug, Clone, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

/// ログのコンテキストをtracingのフィールドに振り分けたもの
/// hold_id / unit_id は個別のフィールドとして出力する
#[derive(Debug, Default, PartialEq)]
struct LogFields {
    hold_id: Option<String>,
    unit_id: Option<String>,
    /// 残りのキーを key=value 形式（キー順）にまとめたもの
    context: String,
}

impl LogFields {
    fn from_context(context: Option<HashMap<String, String>>) -> Self {
        let mut context = context.unwrap_or_default();
        let hold_id = context.remove("hold_id");
        let unit_id = context.remove("unit_id");

        let mut pairs: Vec<String> = context
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        pairs.sort();

        Self {
            hold_id,
            unit_id,
            context: pairs.join(" "),
        }
    }
}

fn format_correlation(correlation_id: Option<Uuid>) -> String {
    correlation_id.map(|id| id.to_string()).unwrap_or_default()
}

impl Logger for TracingLogger {
    fn debug(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        let fields = LogFields::from_context(context);
        tracing::debug!(
            component,
            correlation_id = %format_correlation(correlation_id),
            hold_id = fields.hold_id.as_deref(),
            unit_id = fields.unit_id.as_deref(),
            context = %fields.context,
            "{}",
            message
        );
    }

    fn info(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        let fields = LogFields::from_context(context);
        tracing::info!(
            component,
            correlation_id = %format_correlation(correlation_id),
            hold_id = fields.hold_id.as_deref(),
            unit_id = fields.unit_id.as_deref(),
            context = %fields.context,
            "{}",
            message
        );
    }

    fn warn(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        let fields = LogFields::from_context(context);
        tracing::warn!(
            component,
            correlation_id = %format_correlation(correlation_id),
            hold_id = fields.hold_id.as_deref(),
            unit_id = fields.unit_id.as_deref(),
            context = %fields.context,
            "{}",
            message
        );
    }

    fn error(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        let fields = LogFields::from_context(context);
        tracing::error!(
            component,
            correlation_id = %format_correlation(correlation_id),
            hold_id = fields.hold_id.as_deref(),
            unit_id = fields.unit_id.as_deref(),
            context = %fields.context,
            "{}",
            message
        );
    }
}
