//! SQL schema for the Omega SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Votes are append-only; only article_id is ever filled in afterwards.
CREATE TABLE IF NOT EXISTS votes (
    vote_id     TEXT PRIMARY KEY,
    url         TEXT NOT NULL,
    asset       TEXT NOT NULL,
    model       TEXT NOT NULL,
    relevance   INTEGER NOT NULL,
    sentiment   REAL,              -- NULL unless relevance = 1
    summary     TEXT,
    voted_at    TEXT NOT NULL,     -- ISO 8601 UTC
    article_id  TEXT REFERENCES articles(article_id),
    UNIQUE (url, asset, model),
    CHECK  (relevance = 1 OR sentiment IS NULL)
);

-- Canonical articles: created once per accepted (url, asset), never mutated.
CREATE TABLE IF NOT EXISTS articles (
    article_id     TEXT PRIMARY KEY,
    url            TEXT NOT NULL,
    asset          TEXT NOT NULL,
    published_at   TEXT NOT NULL,
    published_date TEXT NOT NULL,  -- YYYY-MM-DD (UTC) of published_at
    summary        TEXT NOT NULL,
    sentiment      REAL,
    domain         TEXT,
    provenance     TEXT NOT NULL,
    ingested_at    TEXT NOT NULL,
    UNIQUE (url, asset)
);

CREATE TABLE IF NOT EXISTS rejections (
    rejection_id TEXT PRIMARY KEY,
    url          TEXT NOT NULL,
    asset        TEXT NOT NULL,
    reason       TEXT NOT NULL,    -- 'insufficient-votes' | 'not-relevant'
    votes_json   TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

-- Written by the harvesting side only.
CREATE TABLE IF NOT EXISTS domain_stats (
    asset           TEXT NOT NULL,
    domain          TEXT NOT NULL,
    harvested_total INTEGER NOT NULL DEFAULT 0,
    stored_total    INTEGER NOT NULL DEFAULT 0,
    llm_accepted    INTEGER NOT NULL DEFAULT 0,
    llm_rejected    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (asset, domain)
);

CREATE TABLE IF NOT EXISTS price_bars (
    asset      TEXT NOT NULL,
    provider   TEXT NOT NULL,
    currency   TEXT NOT NULL,
    date       TEXT NOT NULL,
    open       REAL,
    high       REAL,
    low        REAL,
    close      REAL NOT NULL,
    volume     REAL,
    market_cap REAL,
    PRIMARY KEY (asset, provider, currency, date)
);

CREATE TABLE IF NOT EXISTS daily_sentiment (
    asset                   TEXT NOT NULL,
    date                    TEXT NOT NULL,
    weighted_mean_sentiment REAL,
    article_count           INTEGER NOT NULL,
    PRIMARY KEY (asset, date)
);

-- p_omega is stored for external readers; the store recomputes it on read.
CREATE TABLE IF NOT EXISTS daily_factors (
    asset          TEXT NOT NULL,
    date           TEXT NOT NULL,
    ret_1d         REAL,
    vol_30d        REAL,
    sharpe_30d     REAL,
    sortino_30d    REAL,
    var_1d_95      REAL,
    exp_return_30d REAL,
    sentiment_mean REAL,
    sentiment_norm REAL,
    p_alpha        REAL,
    alpha          REAL NOT NULL,
    p_omega        REAL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    PRIMARY KEY (asset, date)
);

CREATE INDEX IF NOT EXISTS votes_subject_idx   ON votes(url, asset);
CREATE INDEX IF NOT EXISTS articles_date_idx   ON articles(asset, published_date);
CREATE INDEX IF NOT EXISTS rejections_subj_idx ON rejections(url, asset);
CREATE INDEX IF NOT EXISTS price_bars_date_idx ON price_bars(asset, currency, date);

PRAGMA user_version = 1;
";
