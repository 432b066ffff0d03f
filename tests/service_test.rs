mod common;

use std::sync::Arc;

use mockito::Matcher;
use serde_json::json;

use comix_dl::{
    ComixClient, DownloadConfig, DownloadOrchestrator, HttpTransport, OutputFormat, RetryPolicy, select_releases,
};

#[tokio::test]
async fn fetch_select_and_download_against_http_service() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let mut mocks = Vec::new();

    mocks.push(
        server
            .mock("GET", "/manga/abc12/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"result": {"manga_id": 5, "hash_id": "abc12", "title": "Http Manga"}}).to_string())
            .create_async()
            .await,
    );

    let first_page = json!({"result": {"items": [
        {"chapter_id": 11, "number": 1, "scanlation_group": {"name": "GroupA"}},
        {"chapter_id": 12, "number": 1, "scanlation_group": {"name": "GroupB"}},
        {"chapter_id": 13, "number": 2, "is_official": 1}
    ]}});
    mocks.push(
        server
            .mock("GET", "/manga/abc12/chapters")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "1".into()),
                Matcher::UrlEncoded("limit".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body(first_page.to_string())
            .create_async()
            .await,
    );
    for page in 2..=10 {
        mocks.push(
            server
                .mock("GET", "/manga/abc12/chapters")
                .match_query(Matcher::UrlEncoded("page".into(), page.to_string()))
                .with_status(200)
                .with_body(json!({"result": {"items": []}}).to_string())
                .create_async()
                .await,
        );
    }

    for (chapter_id, pages) in [(12u64, 2usize), (13, 1)] {
        let urls: Vec<String> = (1..=pages)
            .map(|p| format!("{}/cdn/{}/{:03}.png", base, chapter_id, p))
            .collect();
        mocks.push(
            server
                .mock("GET", format!("/chapters/{}/", chapter_id).as_str())
                .with_status(200)
                .with_body(common::image_list(&urls).to_string())
                .create_async()
                .await,
        );
        for p in 1..=pages {
            mocks.push(
                server
                    .mock("GET", format!("/cdn/{}/{:03}.png", chapter_id, p).as_str())
                    .with_status(200)
                    .with_body(common::png_bytes())
                    .create_async()
                    .await,
            );
        }
    }

    let transport = Arc::new(HttpTransport::new().unwrap());
    let client = ComixClient::with_base_url(transport, RetryPolicy::new(1, std::time::Duration::ZERO), base.clone());

    let (manga, catalog) = client
        .fetch_catalog_for_url("https://comix.to/title/abc12-http-manga")
        .await
        .unwrap();
    assert_eq!(manga.title, "Http Manga");
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog[2].group_name.as_deref(), Some("Official"));

    let selected = select_releases(&catalog, Some("GroupB"));
    let ids: Vec<u64> = selected.iter().map(|c| c.chapter_id).collect();
    assert_eq!(ids, vec![12, 13]);

    let dir = tempfile::tempdir().unwrap();
    let config = DownloadConfig {
        output_format: OutputFormat::Cbz,
        download_path: dir.path().to_path_buf(),
        retry_delay: 0.0,
        ..DownloadConfig::default()
    };
    let report = DownloadOrchestrator::new(client)
        .download_batch(manga, selected, config)
        .await
        .unwrap();

    assert_eq!((report.successful, report.failed), (2, 0));
    assert!(dir.path().join("http-manga").join("chapter-1.cbz").exists());
    assert!(dir.path().join("http-manga").join("chapter-2.cbz").exists());

    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn image_server_errors_fail_the_chapter() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let _list = server
        .mock("GET", "/chapters/1/")
        .with_status(200)
        .with_body(common::image_list(&[format!("{}/cdn/1/001.jpg", base)]).to_string())
        .create_async()
        .await;
    let image = server
        .mock("GET", "/cdn/1/001.jpg")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let transport = Arc::new(HttpTransport::new().unwrap());
    let client = ComixClient::with_base_url(transport, RetryPolicy::default(), base);
    let dir = tempfile::tempdir().unwrap();
    let config = DownloadConfig {
        download_path: dir.path().to_path_buf(),
        retry_count: 2,
        retry_delay: 0.0,
        ..DownloadConfig::default()
    };

    let manga = comix_dl::MangaRecord {
        title: String::from("Broken"),
        ..Default::default()
    };
    let report = DownloadOrchestrator::new(client)
        .download_batch(manga, vec![common::chapter(1, "1", None)], config)
        .await
        .unwrap();

    assert_eq!((report.successful, report.failed), (0, 1));
    assert!(report.outcomes[0].message.contains("503"), "{}", report.outcomes[0].message);
    image.assert_async().await;
}
