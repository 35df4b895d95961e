//! End-to-end runs against local fixture servers.

use enrollment::config::Config;
use enrollment::coordinator::{Coordinator, RESULTS_FILE, RunOptions, SiteStatus};
use enrollment::data::checkpoint::{Checkpoint, CheckpointStore};
use enrollment::data::output::{read_csv, write_outputs};
use enrollment::data::records::CourseRecord;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const YEARS: &str = r#"<html><body><table id="years">
    <tr><td><a href="search?academicYear=20242025">2024-2025</a></td></tr>
</table></body></html>"#;

const BROWSE: &str = r#"<html><body><div class="departmentsContainer">
    <h2 class="schoolName">School of Engineering</h2>
    <ul><li><a href="search?q=CS">Computer Science (CS)</a></li></ul>
</div></body></html>"#;

const FIRST_PAGE: &str = r#"<html><body>
    <div class="searchResult">
      <h2>CS 106A: Programming Methodology</h2>
      <div>2024-2025 Autumn | Units: 3-5 | Students enrolled: 412 / 450</div>
    </div>
    <a href="search?page=1">next</a>
</body></html>"#;

const SECOND_PAGE: &str = r#"<html><body>
    <div class="searchResult">
      <h2>CS 161: Design and Analysis of Algorithms</h2>
      <div>Units: 3-5 | Students enrolled: 280 / 300</div>
    </div>
</body></html>"#;

fn config(dir: &std::path::Path) -> Config {
    Config {
        output_dir: dir.to_path_buf(),
        scraper_api_key: None,
        ..Config::default()
    }
}

async fn mount_stanford(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(YEARS))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/browse"))
        .and(query_param("academicYear", "20242025"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BROWSE))
        .mount(server)
        .await;
    for (page, body) in [("0", FIRST_PAGE), ("1", SECOND_PAGE)] {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "CS"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_stanford_run_writes_dataset() {
    let server = MockServer::start().await;
    mount_stanford(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let options = RunOptions {
        allow_direct: true,
        no_delay: true,
        ..RunOptions::default()
    };
    let coordinator = Coordinator::new(config(dir.path()), options)
        .unwrap()
        .with_base_url("stanford", &server.uri());

    let summary = coordinator.run(&["stanford".to_string()]).await.unwrap();
    let result = &summary.results["stanford"];
    assert_eq!(result.status, SiteStatus::Success);
    assert_eq!(result.records, 2);
    assert!(!summary.has_failures());

    let csv = dir.path().join("stanford").join("stanford_enrollment.csv");
    let json = dir.path().join("stanford").join("stanford_enrollment.json");
    assert!(json.exists());
    assert!(dir.path().join(RESULTS_FILE).exists());

    let records = read_csv(&csv).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].course_code, "CS 106A");
    assert_eq!(records[0].enrollment.as_deref(), Some("412/450"));
    assert_eq!(records[0].term.as_deref(), Some("20242025"));
    assert_eq!(records[0].department.as_deref(), Some("Computer Science"));
    assert_eq!(records[0].school.as_deref(), Some("School of Engineering"));
    assert_eq!(records[1].course_code, "CS 161");
    assert_eq!(records[1].term_label.as_deref(), Some("2024-2025"));
}

#[tokio::test]
async fn test_update_merges_term_through_proxy() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("api_key", "test-key"))
        .and(query_param("url", "http://louslist.test/?Semester=1258"))
        .and(query_param("render", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<table>
                 <tr><td>CS 2100</td><td>Data Structures and Algorithms 1</td><td>318 / 320</td></tr>
                 <tr><td>CS 3100</td><td>Data Structures and Algorithms 2</td><td>190 / 200</td></tr>
               </table>"#,
        ))
        .expect(1)
        .mount(&proxy)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        scraper_api_key: Some("test-key".to_string()),
        proxy_endpoint: proxy.uri(),
        ..config(dir.path())
    };
    let options = RunOptions {
        no_delay: true,
        ..RunOptions::default()
    };
    let coordinator = Coordinator::new(config, options)
        .unwrap()
        .with_base_url("uva", "http://louslist.test");

    let site = coordinator.sites().find(|s| s.key == "uva").unwrap();
    let paths = site.output_paths(dir.path());
    let mut stale = CourseRecord::new("CS 2100");
    stale.term = Some("1258".to_string());
    stale.term_label = Some("Fall 2025".to_string());
    let mut kept = CourseRecord::new("CS 2100");
    kept.term = Some("1252".to_string());
    kept.term_label = Some("Spring 2025".to_string());
    write_outputs(&paths, &[stale, kept]).unwrap();

    let total = coordinator.update("uva", "1258").await.unwrap();
    assert_eq!(total, 3);

    let merged = read_csv(&paths.csv).unwrap();
    let codes: Vec<_> = merged
        .iter()
        .map(|r| (r.term.as_deref().unwrap(), r.course_code.as_str()))
        .collect();
    assert_eq!(codes, vec![("1252", "CS 2100"), ("1258", "CS 2100"), ("1258", "CS 3100")]);
    assert_eq!(merged[1].enrollment.as_deref(), Some("318/320"));
}

#[tokio::test]
async fn test_failed_update_leaves_dataset_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let options = RunOptions {
        no_delay: true,
        ..RunOptions::default()
    };
    let coordinator = Coordinator::new(config(dir.path()), options)
        .unwrap()
        .with_base_url("uva", &server.uri());

    let site = coordinator.sites().find(|s| s.key == "uva").unwrap();
    let paths = site.output_paths(dir.path());
    let mut existing = CourseRecord::new("CS 2100");
    existing.term = Some("1258".to_string());
    existing.term_label = Some("Fall 2025".to_string());
    write_outputs(&paths, &[existing]).unwrap();
    let csv_before = std::fs::read_to_string(&paths.csv).unwrap();
    let json_before = std::fs::read_to_string(&paths.json).unwrap();

    let err = coordinator.update("uva", "1258").await.unwrap_err();
    assert!(err.to_string().contains("no records scraped"));

    assert_eq!(std::fs::read_to_string(&paths.csv).unwrap(), csv_before);
    assert_eq!(std::fs::read_to_string(&paths.json).unwrap(), json_before);
}

#[tokio::test]
async fn test_mode_ignores_stored_checkpoint() {
    let server = MockServer::start().await;
    mount_stanford(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::in_dir(&dir.path().join("stanford"));
    let resume_point = Checkpoint {
        year_idx: 0,
        dept_idx: 1,
        ..Checkpoint::default()
    };
    store.save(&resume_point).unwrap();

    let options = RunOptions {
        test_mode: true,
        allow_direct: true,
        no_delay: true,
        ..RunOptions::default()
    };
    let coordinator = Coordinator::new(config(dir.path()), options)
        .unwrap()
        .with_base_url("stanford", &server.uri());

    let summary = coordinator.run(&["stanford".to_string()]).await.unwrap();
    assert_eq!(summary.results["stanford"].records, 2, "the stored unit index must not skip CS");
    assert_eq!(store.load(), Some(resume_point));
}
