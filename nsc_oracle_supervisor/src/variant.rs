//! Market variant layer: turn a creation request into the immutable inputs of
//! a resolution task.
//!
//! This module owns everything variant-specific:
//! - parameter validation
//! - data-source URL
//! - model instruction and comparative principle
//! - composing a web render and a prompt call into one `NondetTask`
//!
//! The engine, parser and encoder never see the variant.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use nsc_oracle_core::{
    Address, LabelSet, Market, NondetTask, OracleError, OutcomeSchema, Policy,
    RenderMode, TaskError, TaskOutput, TaskParams,
};

use crate::dispatch::BridgeCfg;

/// Page text beyond this many characters is not sent to the model.
pub const CONTENT_EXCERPT_CHARS: usize = 1500;

/// News regions with a known regional front page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    NA,
    EU,
    AF,
    AS,
    SA,
}

impl Region {
    pub const ALL: [Region; 5] = [Region::NA, Region::EU, Region::AF, Region::AS, Region::SA];

    pub fn code(self) -> &'static str {
        match self {
            Region::NA => "NA",
            Region::EU => "EU",
            Region::AF => "AF",
            Region::AS => "AS",
            Region::SA => "SA",
        }
    }

    pub fn news_url(self) -> &'static str {
        match self {
            Region::NA => "https://www.bbc.com/news/us-canada",
            Region::EU => "https://www.bbc.com/news/world/europe",
            Region::AF => "https://www.bbc.com/news/world/africa",
            Region::AS => "https://www.bbc.com/news/world/asia",
            Region::SA => "https://www.bbc.com/news/world/latin_america",
        }
    }
}

impl FromStr for Region {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.code() == s)
            .ok_or_else(|| OracleError::validation(format!("region `{s}` must be one of NA, EU, AF, AS, SA")))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketVariant {
    Crypto { token_symbol: String, token_name: String },
    Stock { stock_symbol: String, company_name: String },
    News { region: Region },
}

impl MarketVariant {
    pub fn crypto(token_symbol: impl Into<String>, token_name: impl Into<String>) -> Self {
        MarketVariant::Crypto {
            token_symbol: token_symbol.into().to_uppercase(),
            token_name: token_name.into(),
        }
    }

    pub fn stock(stock_symbol: impl Into<String>, company_name: impl Into<String>) -> Self {
        MarketVariant::Stock {
            stock_symbol: stock_symbol.into().to_uppercase(),
            company_name: company_name.into(),
        }
    }

    pub fn news(region_code: &str) -> Result<Self, OracleError> {
        Ok(MarketVariant::News { region: region_code.parse()? })
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        let (a, b, what) = match self {
            MarketVariant::Crypto { token_symbol, token_name } => (token_symbol, token_name, "token_symbol and token_name"),
            MarketVariant::Stock { stock_symbol, company_name } => (stock_symbol, company_name, "stock_symbol and company_name"),
            MarketVariant::News { .. } => return Ok(()),
        };
        if a.trim().is_empty() || b.trim().is_empty() {
            return Err(OracleError::validation(format!("{what} are required")));
        }
        Ok(())
    }

    pub fn resolution_url(&self) -> String {
        match self {
            MarketVariant::Crypto { token_name, .. } => {
                format!("https://coinmarketcap.com/currencies/{}/", token_name.to_lowercase())
            }
            MarketVariant::Stock { stock_symbol, .. } => {
                format!("https://markets.businessinsider.com/stocks/{}-stock", stock_symbol.to_lowercase())
            }
            MarketVariant::News { region } => region.news_url().to_string(),
        }
    }

    pub fn render_mode(&self) -> RenderMode {
        match self {
            MarketVariant::News { .. } => RenderMode::Screenshot,
            _ => RenderMode::Text,
        }
    }

    pub fn schema(&self) -> OutcomeSchema {
        match self {
            MarketVariant::News { .. } => OutcomeSchema::FlagAndWinner,
            _ => OutcomeSchema::PriceAndWinner,
        }
    }

    /// Price markets demand identical results; news reads are compared semantically.
    pub fn policy(&self, labels: &LabelSet) -> Policy {
        match self {
            MarketVariant::News { .. } => Policy::Comparative { principle: news_principle(labels) },
            _ => Policy::Strict,
        }
    }

    pub fn instruction(&self, market_title: &str, labels: &LabelSet) -> String {
        let (a, b) = (&labels.side_a, &labels.side_b);
        let preamble = format!(
            "The market below is being resolved now. Any future time named in its title has been reached.\n\
             Market: \"{market_title}\"\nSide A: \"{a}\"\nSide B: \"{b}\"\n"
        );
        match self {
            MarketVariant::Crypto { token_symbol, token_name } => format!(
                "{preamble}\nFrom the page content about {token_name} ({token_symbol}), read the current USD price \
                 and decide which side the title's condition makes the winner.\n{}",
                price_reply_format(a, b, "65000.50")
            ),
            MarketVariant::Stock { stock_symbol, company_name } => format!(
                "{preamble}\nFrom the page content about {company_name} ({stock_symbol}), read the current USD stock \
                 price and decide which side the title's condition makes the winner.\n{}",
                price_reply_format(a, b, "150.25")
            ),
            MarketVariant::News { region } => format!(
                "{preamble}\nThe attached image is the BBC {region} news front page. Scan the headlines for news that \
                 confirms or denies the prediction in the title, then decide which side wins.\n\
                 Reply with a JSON object only:\n\
                 {{\"announcement_found\": true or false, \"winner\": \"<exact side text>\", \"reasoning\": \"<one sentence>\"}}\n\
                 The winner must be exactly \"{a}\" or \"{b}\"."
            ),
        }
    }

    /// Immutable inputs for every executor of this market.
    pub fn task_params(&self, market: &Market) -> TaskParams {
        TaskParams {
            market_title: market.title.clone(),
            labels: market.labels.clone(),
            url: self.resolution_url(),
            mode: self.render_mode(),
            schema: self.schema(),
            instruction: self.instruction(&market.title, &market.labels),
        }
    }
}

fn price_reply_format(a: &str, b: &str, example: &str) -> String {
    format!(
        "Reply with a JSON object only, shaped like {{\"price\": {example}, \"winner\": \"{a}\"}}.\n\
         price is a bare number. winner must be exactly \"{a}\" or \"{b}\"; never \"Side A\" or \"Side B\"."
    )
}

fn news_principle(labels: &LabelSet) -> String {
    let (a, b) = (&labels.side_a, &labels.side_b);
    format!(
        "Two news analyses are equivalent when they agree on announcement_found (both true or both false), \
         name the same winner (exactly \"{a}\" or \"{b}\"), and reach the same market conclusion. \
         Differences in reasoning text or JSON formatting do not matter."
    )
}

/// A market creation request, as received from the outside world.
#[derive(Clone, Debug)]
pub struct MarketRequest<'a> {
    pub market_id: Cow<'a, str>,
    pub market_title: Cow<'a, str>,
    pub side_a: Cow<'a, str>,
    pub side_b: Cow<'a, str>,
    pub variant: MarketVariant,
    /// Address the resolution is delivered to; defaults to `market_id` when that is an address.
    pub target: Option<Address>,
    /// Overrides the supervisor's default bridge route.
    pub bridge: Option<BridgeCfg>,
}

impl<'a> MarketRequest<'a> {
    pub fn new(
        market_id: impl Into<Cow<'a, str>>,
        market_title: impl Into<Cow<'a, str>>,
        side_a: impl Into<Cow<'a, str>>,
        side_b: impl Into<Cow<'a, str>>,
        variant: MarketVariant,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            market_title: market_title.into(),
            side_a: side_a.into(),
            side_b: side_b.into(),
            variant,
            target: None,
            bridge: None,
        }
    }

    pub fn with_target(mut self, target: Address) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_bridge(mut self, bridge: BridgeCfg) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Validate everything that can be checked before a task runs.
    pub fn to_market(&self) -> Result<Market, OracleError> {
        self.variant.validate()?;
        let market = Market::new(
            self.market_id.as_ref(),
            self.market_title.as_ref(),
            self.side_a.as_ref(),
            self.side_b.as_ref(),
        )?;
        Ok(match self.target {
            Some(t) => market.with_target(t),
            None => market,
        })
    }
}

/// What a render call produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rendered {
    Text(String),
    Screenshot(Vec<u8>),
}

/// Fetches a page. Implemented by the host.
pub trait WebRenderer {
    fn render(&self, url: &str, mode: RenderMode) -> Result<Rendered, TaskError>;
}

/// Runs one model prompt. Implemented by the host.
pub trait PromptRunner {
    fn exec_prompt(&self, prompt: &str, images: &[Vec<u8>]) -> Result<String, TaskError>;
}

/// Render the data source, then ask the model; one call of each per executor.
#[derive(Clone, Debug)]
pub struct WebPromptTask<R, P> {
    pub renderer: R,
    pub runner: P,
}

impl<R, P> WebPromptTask<R, P> {
    pub fn new(renderer: R, runner: P) -> Self {
        Self { renderer, runner }
    }
}

impl<R: WebRenderer, P: PromptRunner> NondetTask for WebPromptTask<R, P> {
    fn execute(&self, executor: usize, params: &TaskParams) -> Result<TaskOutput, TaskError> {
        let rendered = self.renderer.render(&params.url, params.mode)?;
        let (prompt, images) = match rendered {
            Rendered::Text(content) => {
                let excerpt: String = content.chars().take(CONTENT_EXCERPT_CHARS).collect();
                (format!("{}\n\nPage content:\n{excerpt}", params.instruction), Vec::new())
            }
            Rendered::Screenshot(png) => (params.instruction.clone(), vec![png]),
        };
        let text = self.runner.exec_prompt(&prompt, &images)?;
        tracing::trace!(executor, reply_len = text.len(), "prompt answered");
        Ok(TaskOutput::text(text))
    }
}
