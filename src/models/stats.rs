use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;

use super::card::display_logo;
use super::non_empty;
use crate::store::{Row, Store, StoreError};

pub const DEFAULT_RANKING: i64 = 20;
pub const MAX_RANKING: i64 = 50;

/// Visit counters are bucketed by UTC calendar day.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub pv: i64,
    pub uv: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct DailyVisits {
    pub date: String,
    pub pv: i64,
    pub uv: i64,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub today: Counts,
    pub total: Counts,
    #[serde(rename = "weekData")]
    pub week_data: Vec<DailyVisits>,
    #[serde(rename = "cardCount")]
    pub card_count: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RankedCard {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub logo_url: Option<String>,
    pub custom_logo_path: Option<String>,
    pub display_logo: String,
    pub clicks: i64,
}

impl RankedCard {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        let url = row.string("url")?;
        let logo_url = non_empty(row.opt_string("logo_url")?);
        let custom_logo_path = non_empty(row.opt_string("custom_logo_path")?);
        Ok(RankedCard {
            id: row.i64("id")?,
            title: row.string("title")?,
            display_logo: display_logo(&url, logo_url.as_deref(), custom_logo_path.as_deref()),
            url,
            logo_url,
            custom_logo_path,
            clicks: row.opt_i64("clicks")?.unwrap_or(0),
        })
    }
}

pub struct Stats;

impl Stats {
    /// Count one page view on `date`; unique visitors only when
    /// `new_visitor` is set. A day's first row always starts at 1/1.
    pub fn record_visit(store: &dyn Store, date: &str, new_visitor: bool) -> Result<(), StoreError> {
        store.run(
            "INSERT INTO visits (date, pv, uv) VALUES (?, 1, 1)
             ON CONFLICT(date) DO UPDATE SET pv = visits.pv + 1, uv = visits.uv + ?",
            args![date, if new_visitor { 1 } else { 0 }],
        )?;
        Ok(())
    }

    /// Returns false when the card does not exist.
    pub fn record_click(store: &dyn Store, card_id: i64) -> Result<bool, StoreError> {
        if store.get("SELECT id FROM cards WHERE id = ?", args![card_id])?.is_none() {
            return Ok(false);
        }
        let now = Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S").to_string();
        store.run(
            "INSERT INTO card_clicks (card_id, clicks, last_clicked) VALUES (?, 1, ?)
             ON CONFLICT(card_id) DO UPDATE SET clicks = card_clicks.clicks + 1,
             last_clicked = excluded.last_clicked",
            args![card_id, now],
        )?;
        Ok(true)
    }

    pub fn ranking(store: &dyn Store, limit: i64) -> Result<Vec<RankedCard>, StoreError> {
        let limit = limit.clamp(1, MAX_RANKING);
        store
            .query(
                "SELECT c.id, c.title, c.url, c.logo_url, c.custom_logo_path, cc.clicks
                 FROM card_clicks cc
                 JOIN cards c ON cc.card_id = c.id
                 ORDER BY cc.clicks DESC, c.id
                 LIMIT ?",
                args![limit],
            )?
            .iter()
            .map(RankedCard::from_row)
            .collect()
    }

    pub fn summary(store: &dyn Store, today: NaiveDate) -> Result<Summary, StoreError> {
        let today_counts = match store.get(
            "SELECT pv, uv FROM visits WHERE date = ?",
            args![day_key(today)],
        )? {
            Some(row) => Counts {
                pv: row.opt_i64("pv")?.unwrap_or(0),
                uv: row.opt_i64("uv")?.unwrap_or(0),
            },
            None => Counts::default(),
        };

        let total = match store.get(
            "SELECT COALESCE(SUM(pv), 0) AS pv, COALESCE(SUM(uv), 0) AS uv FROM visits",
            &[],
        )? {
            Some(row) => Counts {
                pv: row.opt_i64("pv")?.unwrap_or(0),
                uv: row.opt_i64("uv")?.unwrap_or(0),
            },
            None => Counts::default(),
        };

        let week_ago = day_key(today - Duration::days(7));
        let week_data = store
            .query(
                "SELECT date, pv, uv FROM visits WHERE date >= ? ORDER BY date DESC",
                args![week_ago],
            )?
            .iter()
            .map(|row| {
                Ok(DailyVisits {
                    date: row.string("date")?,
                    pv: row.opt_i64("pv")?.unwrap_or(0),
                    uv: row.opt_i64("uv")?.unwrap_or(0),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let card_count = match store.get("SELECT COUNT(*) AS count FROM cards", &[])? {
            Some(row) => row.i64("count")?,
            None => 0,
        };

        Ok(Summary {
            today: today_counts,
            total,
            week_data,
            card_count,
        })
    }
}
