//! Tracking injector: makes a rendered HTML body individually trackable per
//! recipient. Link rewriting mutates the parsed DOM instead of pattern
//! matching raw markup, so nested quotes and multiline attributes survive.

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

/// Path of the open-tracking beacon endpoint, relative to the tracking host.
pub const OPEN_PATH: &str = "/track/open";
/// Path of the click-tracking redirect endpoint.
pub const CLICK_PATH: &str = "/track/click";

/// Appended once per message when tracking is on.
const PRIVACY_NOTICE: &str = "<div style=\"max-width:600px;margin:16px auto 0;\
font-size:11px;color:#999;\">This message uses open and click tracking so we \
can measure engagement. To opt out of tracking, reply to this email with the \
subject line &quot;no tracking&quot;.</div>";

/// Beacon URL: encodes the message id, the recipient and a cache-busting
/// timestamp. Mail clients fetch it over plain HTTP(S) with no auth.
pub fn beacon_url(base_url: &str, message_id: &str, recipient: &str, cache_bust: i64) -> Option<String> {
    let endpoint = format!("{}{}", base_url.trim_end_matches('/'), OPEN_PATH);
    let t = cache_bust.to_string();
    match Url::parse_with_params(
        &endpoint,
        &[("id", message_id), ("r", recipient), ("t", t.as_str())],
    ) {
        Ok(u) => Some(u.to_string()),
        Err(e) => {
            warn!(error = %e, base_url, "invalid tracking base url, beacon skipped");
            None
        }
    }
}

/// Tracked redirect URL carrying the original destination as a query
/// parameter. The click endpoint redirects to that parameter and never to its
/// own request URL.
pub fn click_url(base_url: &str, message_id: &str, recipient: &str, destination: &str) -> Option<String> {
    let endpoint = format!("{}{}", base_url.trim_end_matches('/'), CLICK_PATH);
    match Url::parse_with_params(
        &endpoint,
        &[
            ("url", destination),
            ("email_id", message_id),
            ("recipient", recipient),
        ],
    ) {
        Ok(u) => Some(u.to_string()),
        Err(e) => {
            warn!(error = %e, base_url, "invalid tracking base url, link kept as-is");
            None
        }
    }
}

fn should_rewrite(href: &str, base_url: &str) -> bool {
    // Only absolute web links; leave mailto:, tel:, fragments and relative
    // paths alone. Links already pointing at the tracking host stay as-is so
    // a re-injection can never chain redirects.
    (href.starts_with("http://") || href.starts_with("https://")) && !href.starts_with(base_url)
}

/// Rewrite every `a[href]` destination to a tracked redirect, preserving the
/// link's other attributes and inner text. Operates on the parsed DOM.
pub fn rewrite_links(html: &str, message_id: &str, recipient: &str, base_url: &str) -> String {
    let mut document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("Invalid selector");

    let anchor_ids: Vec<_> = document.select(&selector).map(|a| a.id()).collect();

    let mut rewritten = 0usize;
    for id in anchor_ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            if let scraper::Node::Element(element) = node.value() {
                for (name, value) in element.attrs.iter_mut() {
                    if &*name.local != "href" {
                        continue;
                    }
                    let original = value.to_string();
                    if !should_rewrite(&original, base_url) {
                        continue;
                    }
                    if let Some(tracked) = click_url(base_url, message_id, recipient, &original) {
                        *value = tracked.as_str().into();
                        rewritten += 1;
                    }
                }
            }
        }
    }

    debug!(count = rewritten, message_id, "rewrote anchor destinations");
    document.root_element().html()
}

/// Personalize a rendered body for one recipient: rewrite links, then append
/// the beacon pixel and the privacy notice immediately before `</body>`.
/// Documents without a body close tag get the tail appended at the end.
pub fn inject(html: &str, message_id: &str, recipient: &str, base_url: &str, cache_bust: i64) -> String {
    let mut output = rewrite_links(html, message_id, recipient, base_url);

    let mut tail = String::new();
    if let Some(beacon) = beacon_url(base_url, message_id, recipient, cache_bust) {
        tail.push_str(&format!(
            "<img src=\"{}\" width=\"1\" height=\"1\" alt=\"\" style=\"display:block;border:0;\">",
            beacon
        ));
    }
    tail.push_str(PRIVACY_NOTICE);

    match output.rfind("</body>") {
        Some(idx) => output.insert_str(idx, &tail),
        None => output.push_str(&tail),
    }
    output
}
