//! Provider adapters against mock HTTP servers.
//!
//! Each test stands up a `mockito` server, points one adapter at it and
//! checks request shape, payload parsing and error mapping.

use chrono::NaiveDate;
use mockito::Matcher;

use macropanel_core::cancel::CancelToken;
use macropanel_core::data::{
    BlsProvider, FetchError, FetchRange, FredProvider, HttpClient, HttpSettings, MarketProvider,
    NyFedProvider, RateLimit, RetryPolicy, SeriesProvider,
};
use macropanel_core::domain::{Frequency, SourceTag};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn http() -> HttpClient {
    let settings = HttpSettings {
        timeout_secs: 5,
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter: 0.0,
        },
        rate_limit: RateLimit::unlimited(),
        max_concurrency: 2,
        breaker_cooldown_secs: 60,
        breaker_threshold: 10,
    };
    HttpClient::new(&settings, CancelToken::new()).unwrap()
}

fn tag(s: &str) -> SourceTag {
    SourceTag::new(s).unwrap()
}

// ── FRED ─────────────────────────────────────────────────────────────

#[test]
fn fred_observations_with_missing_marker() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/series/observations")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("series_id".into(), "UNRATE".into()),
            Matcher::UrlEncoded("api_key".into(), "test-key".into()),
            Matcher::UrlEncoded("file_type".into(), "json".into()),
            Matcher::UrlEncoded("observation_start".into(), "2024-01-01".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"observations":[
                {"realtime_start":"2024-04-05","date":"2024-01-01","value":"3.7"},
                {"realtime_start":"2024-04-05","date":"2024-02-01","value":"."},
                {"realtime_start":"2024-04-05","date":"2024-03-01","value":"3.8"}
            ]}"#,
        )
        .create();

    let fred = FredProvider::new(tag("fred"), "test-key", http()).with_base_url(server.url());
    let series = fred
        .fetch("UNRATE", &FetchRange::new(Some(d("2024-01-01")), None))
        .unwrap();
    mock.assert();

    assert_eq!(series.len(), 3);
    assert_eq!(series.observed_count(), 2);
    assert!(series.observations()[1].is_missing());
    assert_eq!(series.last_date(), Some(d("2024-03-01")));
}

#[test]
fn fred_unknown_series_is_no_such_series() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/series/observations")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error_code":400,"error_message":"Bad Request.  The series does not exist."}"#)
        .expect(1)
        .create();

    let fred = FredProvider::new(tag("fred"), "k", http()).with_base_url(server.url());
    let batch = fred.fetch_many(&["NOPE"], &FetchRange::all());
    assert_eq!(batch["NOPE"], Err(FetchError::no_such_series("NOPE")));
}

#[test]
fn fred_describe_reads_series_metadata() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/series")
        .match_query(Matcher::UrlEncoded("series_id".into(), "GDP".into()))
        .with_status(200)
        .with_body(
            r#"{"seriess":[{"id":"GDP","frequency_short":"Q","units":"Billions of Dollars",
                "last_updated":"2024-03-28 07:52:02-05"}]}"#,
        )
        .create();

    let fred = FredProvider::new(tag("fred"), "k", http()).with_base_url(server.url());
    let meta = fred.describe("GDP").unwrap();
    assert_eq!(meta.frequency, Some(Frequency::Quarterly));
    assert_eq!(meta.units.as_deref(), Some("Billions of Dollars"));
    assert_eq!(
        meta.last_updated,
        Some(d("2024-03-28").and_hms_opt(7, 52, 2).unwrap())
    );
}

// ── NY Fed ───────────────────────────────────────────────────────────

#[test]
fn nyfed_paginates_and_downloads_each_endpoint_once() {
    let mut server = mockito::Server::new();
    let page1 = server
        .mock("GET", "/rates/unsecured/effr/search.json")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("startDate".into(), "2024-01-01".into()),
            Matcher::UrlEncoded("endDate".into(), "2024-01-10".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"refRates":[
                {"effectiveDate":"2024-01-02","type":"EFFR","percentRate":5.33,"volumeInBillions":"98"},
                {"effectiveDate":"2024-01-03","type":"EFFR","percentRate":5.33,"volumeInBillions":"101"}
            ]}"#,
        )
        .expect(1)
        .create();
    let page2 = server
        .mock("GET", "/rates/unsecured/effr/search.json")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("startDate".into(), "2024-01-11".into()),
            Matcher::UrlEncoded("endDate".into(), "2024-01-15".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"refRates":[
                {"effectiveDate":"2024-01-12","type":"EFFR","percentRate":5.32,"volumeInBillions":"1,020"}
            ]}"#,
        )
        .expect(1)
        .create();

    let nyfed = NyFedProvider::new(tag("nyfed"), http())
        .with_base_url(server.url())
        .with_page_days(10);
    let range = FetchRange::new(Some(d("2024-01-01")), Some(d("2024-01-15")));
    let batch = nyfed.fetch_many(
        &[
            "rates/unsecured/effr:percentRate",
            "rates/unsecured/effr:volumeInBillions",
            "rates/unsecured/effr:nonexistentField",
        ],
        &range,
    );
    page1.assert();
    page2.assert();

    let rate = batch["rates/unsecured/effr:percentRate"].as_ref().unwrap();
    assert_eq!(rate.len(), 3);
    assert_eq!(rate.observations()[2].value, 5.32);
    let volume = batch["rates/unsecured/effr:volumeInBillions"].as_ref().unwrap();
    assert_eq!(volume.observations()[2].value, 1020.0);
    assert!(matches!(
        batch["rates/unsecured/effr:nonexistentField"],
        Err(FetchError::NoSuchSeries { .. })
    ));
}

// ── BLS ──────────────────────────────────────────────────────────────

#[test]
fn bls_batch_post_maps_periods() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/timeseries/data/")
        .match_body(Matcher::PartialJsonString(
            r#"{"seriesid":["LNS14000000","CES9999999999"],"startyear":"2023","endyear":"2024"}"#.into(),
        ))
        .with_status(200)
        .with_body(
            r#"{"status":"REQUEST_SUCCEEDED","responseTime":120,"message":[],"Results":{"series":[
                {"seriesID":"LNS14000000","data":[
                    {"year":"2024","period":"M02","periodName":"February","value":"3.9","footnotes":[{}]},
                    {"year":"2024","period":"M01","periodName":"January","value":"3.7","footnotes":[{}]},
                    {"year":"2023","period":"M13","periodName":"Annual","value":"3.6","footnotes":[{}]}
                ]},
                {"seriesID":"CES9999999999","data":[]}
            ]}}"#,
        )
        .expect(1)
        .create();

    let bls = BlsProvider::new(tag("bls"), None, http()).with_base_url(server.url());
    let range = FetchRange::new(Some(d("2023-01-01")), Some(d("2024-12-31")));
    let batch = bls.fetch_many(&["LNS14000000", "CES9999999999"], &range);
    mock.assert();

    let unrate = batch["LNS14000000"].as_ref().unwrap();
    assert_eq!(unrate.frequency, Some(Frequency::Monthly));
    assert_eq!(unrate.first_date(), Some(d("2024-01-01")));
    assert_eq!(unrate.observations()[1].value, 3.9);
    assert!(matches!(batch["CES9999999999"], Err(FetchError::NoSuchSeries { .. })));
}

#[test]
fn bls_failed_status_is_permanent() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/timeseries/data/")
        .with_status(200)
        .with_body(
            r#"{"status":"REQUEST_NOT_PROCESSED","message":["daily threshold for total number of requests allocated to the user has been reached."]}"#,
        )
        .create();

    let bls = BlsProvider::new(tag("bls"), None, http()).with_base_url(server.url());
    let range = FetchRange::new(Some(d("2024-01-01")), Some(d("2024-12-31")));
    assert!(matches!(
        bls.fetch("LNS14000000", &range),
        Err(FetchError::Permanent(_))
    ));
}

// ── Market data ──────────────────────────────────────────────────────

#[test]
fn market_chart_adjusted_close() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", Matcher::Regex(r"^/v8/finance/chart/.*GSPC$".into()))
        .match_query(Matcher::UrlEncoded("interval".into(), "1d".into()))
        .with_status(200)
        .with_body(
            r#"{"chart":{"result":[{
                "meta":{"symbol":"^GSPC","gmtoffset":-18000},
                "timestamp":[1704205800,1704292200],
                "indicators":{"quote":[{"close":[4742.83,4704.81]}],"adjclose":[{"adjclose":[4742.83,4704.81]}]}
            }],"error":null}}"#,
        )
        .create();

    let market = MarketProvider::new(tag("market"), http()).with_base_url(server.url());
    let range = FetchRange::new(Some(d("2024-01-02")), Some(d("2024-01-03")));
    let spx = market.fetch("^GSPC", &range).unwrap();
    mock.assert();

    assert_eq!(spx.frequency, Some(Frequency::Daily));
    assert_eq!(spx.first_date(), Some(d("2024-01-02")));
    assert_eq!(spx.observations()[1].value, 4704.81);
}

#[test]
fn market_unknown_symbol() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", Matcher::Regex(r"^/v8/finance/chart/".into()))
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#)
        .create();

    let market = MarketProvider::new(tag("market"), http()).with_base_url(server.url());
    assert!(matches!(
        market.fetch("ZZZZ", &FetchRange::all()),
        Err(FetchError::NoSuchSeries { .. })
    ));
}
