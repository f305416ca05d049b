use std::sync::Arc;

use chrono::{TimeZone, Utc};
use harvester::error::AppError;
use harvester::models::PmhRecord;
use harvester::pmh::{PmhHarvester, PmhIterator};
use harvester::services::{ConcurrentIterator, Next};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn records_page(ids: &[&str], token: Option<&str>, size: usize) -> String {
    let records: String = ids
        .iter()
        .map(|id| {
            format!(
                "<record><header><identifier>{id}</identifier><datestamp>2024-01-01</datestamp></header>\
                 <metadata><oai_dc:dc xmlns:oai_dc=\"http://www.openarchives.org/OAI/2.0/oai_dc/\" \
                 xmlns:dc=\"http://purl.org/dc/elements/1.1/\"><dc:title>Title {id}</dc:title>\
                 </oai_dc:dc></metadata></record>"
            )
        })
        .collect();
    let token = match token {
        Some(token) => {
            format!("<resumptionToken completeListSize=\"{size}\">{token}</resumptionToken>")
        }
        None => format!("<resumptionToken completeListSize=\"{size}\"/>"),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <OAI-PMH xmlns=\"http://www.openarchives.org/OAI/2.0/\">\
         <responseDate>2024-01-01T00:00:00Z</responseDate>\
         <ListRecords>{records}{token}</ListRecords></OAI-PMH>"
    )
}

fn error_response(code: &str, message: &str) -> String {
    format!(
        "<OAI-PMH xmlns=\"http://www.openarchives.org/OAI/2.0/\">\
         <error code=\"{code}\">{message}</error></OAI-PMH>"
    )
}

fn harvester(server: &MockServer) -> PmhHarvester {
    let endpoint = Url::parse(&format!("{}/oai", server.uri())).unwrap();
    PmhHarvester::new(Client::new(), endpoint)
}

/// Mount a two-page list of three records.
async fn mount_two_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("metadataPrefix", "oai_dc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(records_page(&["a", "b"], Some("page-2"), 3)),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("resumptionToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(records_page(&["c"], None, 3)))
        .mount(server)
        .await;
}

async fn drain(records: &PmhIterator<PmhRecord>) -> Vec<String> {
    let mut ids = Vec::new();
    loop {
        match records.next().await.expect("page fetch") {
            Next::Item(record) => ids.push(record.identifier),
            Next::Exhausted => return ids,
            Next::Closed => panic!("iterator closed unexpectedly"),
        }
    }
}

#[tokio::test]
async fn test_num_records_uses_complete_list_size() {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    assert_eq!(harvester(&server).num_records().await.unwrap(), 3);
}

#[tokio::test]
async fn test_records_follow_resumption_tokens() {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let records = harvester(&server).records(CancellationToken::new());
    assert_eq!(drain(&records).await, vec!["a", "b", "c"]);
    assert!(matches!(records.next().await.unwrap(), Next::Exhausted));
}

#[tokio::test]
async fn test_records_carry_metadata() {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let records = harvester(&server).records(CancellationToken::new());
    let Next::Item(first) = records.next().await.unwrap() else {
        panic!("expected a record");
    };
    assert_eq!(first.identifier, "a");
    assert_eq!(first.elements.len(), 1);
    assert_eq!(first.elements[0].name(), "dc:title");
    assert_eq!(first.elements[0].value(), "Title a");
}

#[tokio::test]
async fn test_concurrent_pulls_fetch_each_page_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("metadataPrefix", "oai_dc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(records_page(&["1", "2", "3"], Some("next"), 5)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("resumptionToken", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_string(records_page(&["4", "5"], None, 5)))
        .expect(1)
        .mount(&server)
        .await;

    let records = Arc::new(harvester(&server).records(CancellationToken::new()));
    let workers = (0..4).map(|_| {
        let records = Arc::clone(&records);
        tokio::spawn(async move { drain(&records).await })
    });
    let mut ids: Vec<String> = futures::future::join_all(workers)
        .await
        .into_iter()
        .flat_map(|ids| ids.unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn test_no_records_match_is_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(error_response("noRecordsMatch", "No matching records")),
        )
        .mount(&server)
        .await;

    let harvester = harvester(&server);
    assert_eq!(harvester.num_records().await.unwrap(), 0);
    let records = harvester.records(CancellationToken::new());
    assert!(matches!(records.next().await.unwrap(), Next::Exhausted));
}

#[tokio::test]
async fn test_protocol_error_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(error_response("cannotDisseminateFormat", "Unknown prefix")),
        )
        .mount(&server)
        .await;

    match harvester(&server).num_records().await {
        Err(AppError::Pmh { code, message }) => {
            assert_eq!(code, "cannotDisseminateFormat");
            assert_eq!(message, "Unknown prefix");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_http_error_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;

    match harvester(&server).num_records().await {
        Err(AppError::Transport(e)) => {
            assert_eq!(e.method, "GET");
            assert_eq!(e.status, Some(500));
            assert!(e.uri.contains("verb=ListRecords"));
            assert_eq!(e.response_body.as_deref(), Some("overloaded"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_set_and_from_arguments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("metadataPrefix", "dim"))
        .and(query_param("set", "col_2142_10"))
        .and(query_param("from", "2024-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_string(records_page(&["x"], None, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let from = Utc.with_ymd_and_hms(2024, 3, 1, 15, 30, 0).unwrap();
    let harvester = harvester(&server)
        .with_metadata_prefix("dim")
        .with_set(Some("col_2142_10".into()))
        .with_from(Some(from));
    assert_eq!(harvester.num_records().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_page_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("metadataPrefix", "oai_dc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(records_page(&["a"], Some("t"), 2)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("resumptionToken", "t"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("resumptionToken", "t"))
        .respond_with(ResponseTemplate::new(200).set_body_string(records_page(&["b"], None, 2)))
        .mount(&server)
        .await;

    let records = harvester(&server).records(CancellationToken::new());
    assert!(matches!(records.next().await.unwrap(), Next::Item(_)));
    let Next::Item(record) = records.next().await.unwrap() else {
        panic!("expected the retried page");
    };
    assert_eq!(record.identifier, "b");
    assert!(matches!(records.next().await.unwrap(), Next::Exhausted));
}

#[tokio::test]
async fn test_gives_up_after_max_page_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let records = harvester(&server)
        .with_max_page_failures(2)
        .records(CancellationToken::new());
    assert!(records.next().await.is_err());
    assert!(matches!(records.next().await.unwrap(), Next::Exhausted));
    assert!(matches!(records.next().await.unwrap(), Next::Exhausted));
}

#[tokio::test]
async fn test_closed_iterator_does_not_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(records_page(&["a"], None, 1)))
        .expect(0)
        .mount(&server)
        .await;

    let closed = CancellationToken::new();
    let records = harvester(&server).records(closed.child_token());
    closed.cancel();
    assert!(records.is_closed());
    assert!(matches!(records.next().await.unwrap(), Next::Closed));
}

#[tokio::test]
async fn test_list_sets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListSets"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<OAI-PMH xmlns=\"http://www.openarchives.org/OAI/2.0/\"><ListSets>\
             <set><setSpec>com_2142_1</setSpec><setName>Library</setName></set>\
             <set><setSpec>col_2142_10</setSpec><setName>Maps</setName></set>\
             </ListSets></OAI-PMH>",
        ))
        .mount(&server)
        .await;

    let harvester = harvester(&server);
    assert_eq!(harvester.num_sets().await.unwrap(), 2);

    let sets = harvester.sets(CancellationToken::new());
    let mut specs = Vec::new();
    while let Next::Item(set) = sets.next().await.unwrap() {
        specs.push(set.spec);
    }
    assert_eq!(specs, vec!["com_2142_1", "col_2142_10"]);
}
