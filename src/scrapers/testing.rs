//! Test fixtures: listing markup builder and a scripted navigator.

use crate::error::FetchError;
use crate::scrapers::traits::Navigator;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Card {
    pub id: u32,
    pub name: Option<String>,
    pub link: Option<String>,
    pub price: Option<String>,
    pub image: Option<String>,
    pub sku: Option<String>,
    pub availability: Option<String>,
}

impl Card {
    pub fn valid(id: u32) -> Self {
        Self {
            id,
            name: Some(format!("Produto {}", id)),
            link: Some(format!("/produto-{}", id)),
            price: Some(format!("R$ {},90", 100 + id)),
            image: Some(format!("/img/{}.jpg", id)),
            sku: Some(format!("SKU-{}", id)),
            availability: None,
        }
    }

    pub fn with_link(id: u32, link: &str) -> Self {
        Self {
            link: Some(link.to_string()),
            ..Self::valid(id)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Pager {
    None,
    Next,
    NextDisabled,
    /// Numbered links 1..=n and no explicit next control
    Numbered(u32),
}

pub fn listing_html(cards: &[Card], pager: Pager) -> String {
    let mut html = String::from("<html><body><ul class=\"vitrine\">");

    for card in cards {
        html.push_str(&format!(
            "<li><div class=\"listagem-item prod-id-{id}\" data-id=\"{id}\">",
            id = card.id
        ));
        if let Some(link) = &card.link {
            html.push_str(&format!("<a class=\"produto-sobrepor\" href=\"{}\"></a>", link));
        }
        if let Some(image) = &card.image {
            html.push_str(&format!("<img class=\"imagem-principal\" src=\"{}\">", image));
        }
        if let Some(name) = &card.name {
            html.push_str(&format!("<span class=\"nome-produto\">{}</span>", name));
        }
        if let Some(sku) = &card.sku {
            html.push_str(&format!("<span class=\"produto-sku\">{}</span>", sku));
        }
        if let Some(price) = &card.price {
            html.push_str(&format!("<strong class=\"preco-venda\">{}</strong>", price));
        }
        if let Some(text) = &card.availability {
            html.push_str(&format!("<span class=\"disponibilidade\">{}</span>", text));
        }
        html.push_str("</div></li>");
    }
    html.push_str("</ul>");

    match pager {
        Pager::None => {}
        Pager::Next => html.push_str(
            "<div class=\"paginacao\"><ul><li><a rel=\"next\" href=\"?pagina=next\">Próxima</a></li></ul></div>",
        ),
        Pager::NextDisabled => html.push_str(
            "<div class=\"paginacao\"><ul><li class=\"disabled\"><a rel=\"next\" href=\"#\">Próxima</a></li></ul></div>",
        ),
        Pager::Numbered(total) => {
            html.push_str("<div class=\"paginacao\">");
            for n in 1..=total {
                html.push_str(&format!("<a href=\"?pagina={n}\">{n}</a>", n = n));
            }
            html.push_str("</div>");
        }
    }

    html.push_str("</body></html>");
    html
}

/// Navigator that replays scripted responses per URL.
///
/// Each URL has a queue; the last response repeats once the queue is down to
/// one entry. Unknown URLs are a permanent failure.
#[derive(Default)]
pub struct ScriptedNavigator {
    pages: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
    settle: Duration,
}

impl ScriptedNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, markup: String) -> Self {
        self.respond(url, Ok(markup))
    }

    pub fn respond(self, url: &str, response: Result<String, FetchError>) -> Self {
        self.pages
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn transient(self, url: &str) -> Self {
        let error = FetchError::Timeout {
            url: url.to_string(),
            timeout: Duration::from_secs(30),
        };
        self.respond(url, Err(error))
    }

    /// Every response takes `delay`; `settle` is reported as settle time
    pub fn slow(mut self, delay: Duration, settle: Duration) -> Self {
        self.delay = delay;
        self.settle = settle;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|called| *called == url).count()
    }
}

#[async_trait]
impl Navigator for ScriptedNavigator {
    async fn fetch_rendered_page(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut pages = self.pages.lock().unwrap();
        let Some(queue) = pages.get_mut(url) else {
            return Err(FetchError::permanent(url, "no scripted page"));
        };

        if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(|| Err(FetchError::permanent(url, "empty script")))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FetchError::permanent(url, "empty script")))
        }
    }

    fn settle_time(&self) -> Duration {
        self.settle
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
