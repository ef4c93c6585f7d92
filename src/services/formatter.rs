use rust_decimal::Decimal;

use crate::models::ClassifiedEvent;

/// Render the human-readable summary carried by an alert. Adapter-specific
/// markup (embeds, HTML) is each channel adapter's own concern.
pub fn render_alert(rule_id: &str, event: &ClassifiedEvent) -> String {
    format!(
        "[{}] {} {} {} {} @ {} (${} USD) rule={}",
        event.tier,
        shorten_wallet(event.wallet()),
        event.event.side,
        event.event.size.normalize(),
        event.coin(),
        event.event.price.normalize(),
        event.event.notional_usd.round_dp(2),
        rule_id,
    )
}

pub fn shorten_wallet(wallet: &str) -> String {
    if wallet.len() > 10 {
        format!("{}...{}", &wallet[..6], &wallet[wallet.len() - 4..])
    } else {
        wallet.to_string()
    }
}

pub fn format_usd(value: Decimal) -> String {
    format!("${}", value.round_dp(2))
}
