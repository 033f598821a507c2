//! Upstream, storage and sync defaults
//!
//! ## Upstream
//!
//! The VCI trading terminal exposes an undocumented chart API used by its
//! own web client. It rejects requests that do not look like that client
//! (Origin/Referer/User-Agent), and answers HTTP 403 once a caller has been
//! rate-limited. There is no public API program, so the values below mirror
//! what the browser sends.
//!
//! A second upstream, the Simplize company summary endpoint, carries the
//! latest intraday quote for a single stock. It is used to refresh today's
//! bar while the market is open.
//!
//! ## Storage
//!
//! Rows are written through the PostgREST interface of the hosted database
//! (`/rest/v1/{table}`), relying on the table's unique constraint for
//! merge-on-conflict upserts.

/// Base URL of the VCI trading API (trailing slash included)
pub const VCI_BASE_URL: &str = "https://trading.vietcap.com.vn/api/";

/// Origin header expected by the upstream
pub const VCI_ORIGIN: &str = "https://trading.vietcap.com.vn";

/// Referer header expected by the upstream
pub const VCI_REFERER: &str = "https://trading.vietcap.com.vn/";

/// Chart endpoint, relative to [`VCI_BASE_URL`]
pub const VCI_CHART_PATH: &str = "chart/OHLCChart/gap-chart";

/// Lightweight endpoint used to check whether we are currently blocked
pub const VCI_PROBE_PATH: &str = "price/symbols/getByGroup?group=VN30";

/// Daily bars only
pub const VCI_TIME_FRAME: &str = "ONE_DAY";

/// Base URL of the Simplize API (trailing slash included)
pub const SIMPLIZE_BASE_URL: &str = "https://api.simplize.vn/api/";

/// Company summary endpoint, relative to [`SIMPLIZE_BASE_URL`]; the lowercase
/// symbol is appended
pub const SIMPLIZE_SUMMARY_PATH: &str = "company/summary/";

pub const SIMPLIZE_ORIGIN: &str = "https://simplize.vn";
pub const SIMPLIZE_REFERER: &str = "https://simplize.vn/";

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.3 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Market timezone used to turn upstream timestamps into trading dates
pub const MARKET_TIMEZONE: &str = "Asia/Ho_Chi_Minh";

/// Default upstream request timeout
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Default storage request timeout
pub const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 30;

/// Rows per upsert request. Large enough to keep request count low, small
/// enough to stay under the backend's body size and statement timeout.
pub const DEFAULT_UPSERT_CHUNK_SIZE: usize = 500;

/// Fixed pause between symbols
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1500;

/// About one year of trading days
pub const DEFAULT_LOOKBACK: u32 = 365;

/// Extra bars requested on top of the business-day count when filling a range
pub const COUNT_BACK_BUFFER: u32 = 100;

/// Stored dates further apart than this are reported as a gap.
/// Longer than the Tết holiday closure.
pub const DEFAULT_MAX_GAP_DAYS: i64 = 10;

/// Rows requested per page when reading stored dates back. The backend may
/// cap a page lower than this (Supabase defaults to 1000).
pub const EXISTING_DATES_PAGE_SIZE: usize = 1000;

pub const STOCK_PRICES_TABLE: &str = "stock_prices";
pub const MARKET_INDICES_TABLE: &str = "market_indices";

/// VN30 basket
pub const VN30_SYMBOLS: &[&str] = &[
    "ACB", "BCM", "BID", "BVH", "CTG", "FPT", "GAS", "GVR", "HDB", "HPG",
    "MBB", "MSN", "MWG", "PLX", "POW", "SAB", "SSB", "SSI", "STB", "TCB",
    "TPB", "VCB", "VHM", "VIB", "VIC", "VJC", "VNM", "VPB", "VRE", "SHB",
];

/// Market indices as (storage code, upstream code)
pub const MARKET_INDICES: &[(&str, &str)] = &[
    ("VNINDEX", "VNINDEX"),
    ("VN30", "VN30"),
    ("HNX", "HNXIndex"),
    ("UPCOM", "HNXUpcomIndex"),
];
