//! DOM reduction: turn the live document into a compact HTML string a planner
//! can re-read inside a token budget. The traversal itself runs in the page
//! (see [`reduction_script`]); the denylist tables and the query-parameter
//! truncation routine live here as plain data and pure functions so they stay
//! unit-testable, and are serialized into the script only at the automation
//! boundary.

use anyhow::anyhow;
use serde::Deserialize;
use url::Url;

use crate::error::EngineError;
use crate::session::PageDriver;

/// Hard cap on the reduced HTML, in characters (not tokens).
pub const DEFAULT_MAX_CHARS: usize = 18_000;

/// Anchor hrefs keep at most this many query parameters. High-entropy
/// tracking parameters usually sit later in the URL and eat token budget.
pub const MAX_HREF_QUERY_PARAMS: usize = 2;

/// Element kinds that carry no planner-relevant information.
pub const STRIP_SELECTORS: &[&str] = &[
    "script",
    "style",
    "link",
    "meta",
    "title",
    "noscript",
    "br",
    "hr",
    "iframe",
    "template",
    "picture",
    "source",
    "img",
    "svg",
    "video",
    "audio",
    "canvas",
    "object",
    "details",
    "input[type=hidden]",
    "[aria-hidden=true]",
    "[hidden]:not([hidden=false])",
];

/// Attributes stripped from every remaining element. What survives is
/// effectively `id`, `name`, `href`, `value`, `type` and visible `aria-*`.
pub const STRIP_ATTRS: &[&str] = &["class", "target", "rel", "ping", "style", "title"];

/// The page snapshot produced by the reduction program.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reduction {
    pub html: String,
    pub url: String,
}

const REDUCTION_TEMPLATE: &str = r#"
(() => {
  const STRIP_SELECTORS = __STRIP_SELECTORS__;
  const STRIP_ATTRS = __STRIP_ATTRS__;
  const MAX_HREF_PARAMS = __MAX_HREF_PARAMS__;

  let main = document.querySelector('main') || document.querySelector('body');
  main = main.cloneNode(true);

  for (const selector of STRIP_SELECTORS) {
    main.querySelectorAll(selector).forEach((el) => el.remove());
  }

  for (const attr of STRIP_ATTRS) {
    [main].concat(Array.from(main.querySelectorAll('[' + attr + ']')))
      .forEach((el) => el.removeAttribute(attr));
  }

  function truncateQueryParams(url, n) {
    const parsed = new URL(url, location.origin);
    const params = Array.from(parsed.searchParams.entries());
    parsed.searchParams.forEach((value, key) => {
      parsed.searchParams.delete(key);
    });
    for (let i = 0; i < Math.min(n, params.length); i++) {
      parsed.searchParams.append(params[i][0], params[i][1]);
    }
    return parsed.href;
  }

  main.querySelectorAll('*').forEach((el) => {
    if (el instanceof HTMLAnchorElement) {
      const href = el.getAttribute('href');
      if (href) {
        const amps = href.match(/&/g)?.length;
        if (typeof amps === 'number' && amps + 1 > MAX_HREF_PARAMS) {
          el.setAttribute('href', truncateQueryParams(href, MAX_HREF_PARAMS));
        }
      }
    }

    if (el instanceof HTMLElement) {
      Object.keys(el.dataset).forEach((key) => {
        delete el.dataset[key];
      });
    }

    Array.from(el.attributes).forEach((attr) => {
      if (attr.name.startsWith('js')) {
        el.removeAttribute(attr.name);
      }
    });

    const tag = el.tagName.toLowerCase();
    if ((tag === 'div' || tag === 'span') && !el.attributes.length) {
      el.replaceWith(document.createTextNode(' '), ...el.childNodes);
    } else if (el.tagName.includes('-')) {
      el.replaceWith(document.createTextNode(' '), ...el.childNodes);
    }
  });

  main.querySelectorAll('input,textarea,select').forEach((el) => {
    if (el.value) {
      el.setAttribute('value', el.value);
    }
  });

  return JSON.stringify({
    html: main.innerHTML
      .replace(/<!--[\s\S]*?-->/g, '')
      .replace(/\s+/g, ' ')
      .trim(),
    url: location.href,
  });
})()
"#;

/// Build the in-page reduction program. The clone in the script keeps the
/// live page visually and functionally untouched, and the output is a JSON
/// string so the result survives the evaluation boundary by value.
pub fn reduction_script() -> String {
    REDUCTION_TEMPLATE
        .replace(
            "__STRIP_SELECTORS__",
            &serde_json::json!(STRIP_SELECTORS).to_string(),
        )
        .replace(
            "__STRIP_ATTRS__",
            &serde_json::json!(STRIP_ATTRS).to_string(),
        )
        .replace("__MAX_HREF_PARAMS__", &MAX_HREF_QUERY_PARAMS.to_string())
}

/// Run the reduction program against the current page and apply the hard
/// character cap. Evaluation failure is fatal: no usable state can be
/// produced without a snapshot.
pub fn reduce(page: &dyn PageDriver, max_chars: usize) -> Result<Reduction, EngineError> {
    let value = page
        .evaluate(&reduction_script())
        .map_err(EngineError::Reduction)?;
    let raw = value.as_str().ok_or_else(|| {
        EngineError::Reduction(anyhow!("reduction program returned {value} instead of a string"))
    })?;
    let mut reduction: Reduction = serde_json::from_str(raw)
        .map_err(|err| EngineError::Reduction(anyhow!("malformed reduction payload: {err}")))?;
    reduction.html = truncate_chars(&reduction.html, max_chars);
    Ok(reduction)
}

/// Hard cut after `max` characters, not word-aware, safe on multi-byte text.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}

/// Keep the first `n` query parameters of `raw` in their original order and
/// drop the rest. Unparseable input is returned unchanged.
pub fn truncate_query_params(raw: &str, n: usize) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_owned();
    };
    let params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if params.len() <= n {
        return raw.to_owned();
    }
    url.query_pairs_mut()
        .clear()
        .extend_pairs(params.iter().take(n))
        .finish();
    url.to_string()
}
