//! Market-Data Fetcher (§4.E).
//!
//! `fetchFullMarketData(marketRecord)` concurrently requests, per outcome
//! token, best-buy price, best-sell price, order book, and price history,
//! plus a spread endpoint. Grounded on `scrapers/polymarket.rs`'s
//! `PolymarketScraper` (base URL constant + flexible-number deserializer),
//! generalized from a single `/book` GET to the full endpoint set with
//! per-call null-on-failure semantics.

use crate::clob::ClobClient;
use crate::models::{BookLevel, HistoryPoint, MarketRecord, MarketSnapshot, OrderBookSnapshot, TokenPrice, TokenSnapshot};

const BOOK_DEPTH: usize = 10;

pub struct MarketDataFetcher<'a> {
    clob: &'a ClobClient,
}

impl<'a> MarketDataFetcher<'a> {
    pub fn new(clob: &'a ClobClient) -> Self {
        Self { clob }
    }

    pub async fn fetch_full_market_data(&self, market: &MarketRecord) -> MarketSnapshot {
        let yes_token_id = market.tokens[0].token_id.clone();
        let no_token_id = market.tokens[1].token_id.clone();

        let (yes_token, no_token, price_history) = tokio::join!(
            self.fetch_token_snapshot(&yes_token_id),
            self.fetch_token_snapshot(&no_token_id),
            self.fetch_history(&yes_token_id),
        );

        MarketSnapshot {
            market: market.clone(),
            yes_token,
            no_token,
            price_history,
        }
    }

    async fn fetch_token_snapshot(&self, token_id: &str) -> TokenSnapshot {
        let (buy, sell, book, _spread) = tokio::join!(
            self.clob.price(token_id, "buy"),
            self.clob.price(token_id, "sell"),
            self.clob.book(token_id),
            self.clob.spread(token_id),
        );

        let mid = match (buy, sell) {
            (Some(b), Some(s)) => Some((b + s) / 2.0),
            _ => None,
        };

        let book_snapshot = match book {
            Some(raw) => {
                let mut bids: Vec<BookLevel> = raw.bids.into_iter().map(|l| BookLevel { price: l.price, size: l.size }).collect();
                let mut asks: Vec<BookLevel> = raw.asks.into_iter().map(|l| BookLevel { price: l.price, size: l.size }).collect();
                bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
                asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));

                let bid_vol: f64 = bids.iter().map(|l| l.size).sum();
                let ask_vol: f64 = asks.iter().map(|l| l.size).sum();
                let best_bid = bids.first().map(|l| l.price);
                let best_ask = asks.first().map(|l| l.price);
                let spread = match (best_bid, best_ask) {
                    (Some(b), Some(a)) => Some(a - b),
                    _ => None,
                };

                bids.truncate(BOOK_DEPTH);
                asks.truncate(BOOK_DEPTH);

                OrderBookSnapshot { bids, asks, bid_vol, ask_vol, best_bid, best_ask, spread }
            }
            None => OrderBookSnapshot::default(),
        };

        TokenSnapshot { price: TokenPrice { buy, sell, mid }, book: book_snapshot }
    }

    async fn fetch_history(&self, token_id: &str) -> Vec<HistoryPoint> {
        self.clob
            .prices_history(token_id)
            .await
            .into_iter()
            .map(|(t, price)| HistoryPoint { t, price })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;

    #[test]
    fn mid_is_average_of_buy_and_sell() {
        let t = TokenSnapshot {
            price: TokenPrice { buy: Some(0.4), sell: Some(0.6), mid: Some(0.5) },
            book: OrderBookSnapshot::default(),
        };
        assert_eq!(t.price.mid, Some(0.5));
    }

    #[test]
    fn market_record_token_lookup() {
        let m = MarketRecord {
            condition_id: "0x1".into(),
            question: "q".into(),
            end_time: 100,
            tokens: [
                crate::models::MarketToken { token_id: "yes".into(), outcome: Outcome::Up },
                crate::models::MarketToken { token_id: "no".into(), outcome: Outcome::Down },
            ],
            neg_risk: false,
            tick_size: 0.01,
            asset: "btc".into(),
        };
        assert_eq!(m.token_for(Outcome::Up).unwrap().token_id, "yes");
    }
}
