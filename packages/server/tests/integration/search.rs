use std::collections::HashSet;

use serde_json::Value;

use crate::common::{TestApp, routes};

fn filenames(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .expect("response should contain 'data'")
        .iter()
        .map(|f| f["original_filename"].as_str().unwrap().to_string())
        .collect()
}

/// Catalog with a shared text blob, a unique text file and an image.
async fn seeded() -> TestApp {
    let app = TestApp::spawn().await;
    app.upload_as("report-2024.txt", b"quarterly numbers", Some("text/plain"))
        .await;
    app.upload_as("Report-copy.txt", b"quarterly numbers", Some("text/plain"))
        .await;
    app.upload_as("notes.txt", b"n", Some("text/plain")).await;
    app.upload_as("logo.png", b"not really a png image", Some("image/png"))
        .await;
    app
}

mod filters {
    use super::*;

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let app = seeded().await;

        let res = app
            .get(&format!("{}?search=REPORT&sort_by=filename", routes::SEARCH))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(
            filenames(&res.body),
            vec!["Report-copy.txt", "report-2024.txt"]
        );
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let app = TestApp::spawn().await;
        app.upload("100%.txt", b"one").await;
        app.upload("100x.txt", b"two").await;
        app.upload("a_b.txt", b"three").await;
        app.upload("acb.txt", b"four").await;

        let res = app.get(&format!("{}?search=100%25", routes::FILES)).await;
        assert_eq!(filenames(&res.body), vec!["100%.txt"]);

        let res = app.get(&format!("{}?search=a_b", routes::FILES)).await;
        assert_eq!(filenames(&res.body), vec!["a_b.txt"]);
    }

    #[tokio::test]
    async fn file_types_match_any() {
        let app = seeded().await;

        let res = app
            .get(&format!("{}?file_types=image/png", routes::SEARCH))
            .await;
        assert_eq!(filenames(&res.body), vec!["logo.png"]);

        let res = app
            .get(&format!("{}?file_types=image/png,text/plain", routes::SEARCH))
            .await;
        assert_eq!(res.body["pagination"]["total"], 4);
    }

    #[tokio::test]
    async fn size_range_is_inclusive() {
        let app = seeded().await;

        let res = app
            .get(&format!(
                "{}?min_size=17&max_size=22&sort_by=size",
                routes::SEARCH
            ))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        let sizes: Vec<i64> = res.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["size"].as_i64().unwrap())
            .collect();
        assert_eq!(sizes, vec![17, 17, 22]);
    }

    #[tokio::test]
    async fn inverted_size_range_rejected() {
        let app = seeded().await;

        let res = app
            .get(&format!("{}?min_size=10&max_size=5", routes::SEARCH))
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn malformed_numbers_rejected_as_json() {
        let app = seeded().await;

        for path in [
            format!("{}?min_size=abc", routes::FILES),
            format!("{}?max_size=-1", routes::SEARCH),
            format!("{}?page=two", routes::DUPLICATES),
        ] {
            let res = app.get(&path).await;
            assert_eq!(res.status, 400, "{path}: {}", res.text);
            assert_eq!(res.error_code(), "VALIDATION_ERROR", "{path}");
        }
    }

    #[tokio::test]
    async fn date_range_covers_recent_uploads() {
        let app = seeded().await;

        let res = app
            .get(&format!(
                "{}?from_date=2000-01-01T00:00:00Z&to_date=2999-01-01T00:00:00Z",
                routes::SEARCH
            ))
            .await;
        assert_eq!(res.body["pagination"]["total"], 4);

        let res = app
            .get(&format!("{}?to_date=2000-01-01T00:00:00Z", routes::SEARCH))
            .await;
        assert_eq!(res.body["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn duplicates_only_includes_every_sharer() {
        let app = seeded().await;

        let res = app
            .get(&format!(
                "{}?duplicates_only=true&sort_by=filename",
                routes::SEARCH
            ))
            .await;

        assert_eq!(
            filenames(&res.body),
            vec!["Report-copy.txt", "report-2024.txt"]
        );
        for file in res.body["data"].as_array().unwrap() {
            assert_eq!(file["reference_count"], 2);
        }
    }

    #[tokio::test]
    async fn filters_combine() {
        let app = seeded().await;

        let res = app
            .get(&format!(
                "{}?search=o&file_types=text/plain&max_size=1",
                routes::SEARCH
            ))
            .await;
        assert_eq!(filenames(&res.body), vec!["notes.txt"]);
    }
}

mod sorting_and_paging {
    use super::*;

    #[tokio::test]
    async fn sort_by_size_both_directions() {
        let app = seeded().await;

        let asc = app.get(&format!("{}?sort_by=size", routes::FILES)).await;
        let asc: Vec<i64> = asc.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["size"].as_i64().unwrap())
            .collect();
        assert_eq!(asc, vec![1, 17, 17, 22]);

        let desc = app.get(&format!("{}?sort_by=-size", routes::FILES)).await;
        let desc: Vec<i64> = desc.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["size"].as_i64().unwrap())
            .collect();
        assert_eq!(desc, vec![22, 17, 17, 1]);
    }

    #[tokio::test]
    async fn unknown_sort_key_rejected() {
        let app = seeded().await;

        let res = app.get(&format!("{}?sort_by=checksum", routes::FILES)).await;
        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn pages_are_disjoint_and_exhaustive() {
        let app = TestApp::spawn().await;
        for i in 0..7u8 {
            let content = vec![i; usize::from(i) + 1];
            app.upload_ok(&format!("file-{i}.bin"), &content).await;
        }

        let mut seen = HashSet::new();
        for page in 1..=3 {
            let res = app
                .get(&format!(
                    "{}?sort_by=size&page={page}&page_size=3",
                    routes::FILES
                ))
                .await;
            assert_eq!(res.status, 200, "{}", res.text);

            let pagination = &res.body["pagination"];
            assert_eq!(pagination["page"], page);
            assert_eq!(pagination["per_page"], 3);
            assert_eq!(pagination["total"], 7);
            assert_eq!(pagination["total_pages"], 3);
            assert_eq!(pagination["has_previous"], page > 1);
            assert_eq!(pagination["has_next"], page < 3);

            for file in res.body["data"].as_array().unwrap() {
                assert!(seen.insert(file["id"].as_str().unwrap().to_string()));
            }
        }
        assert_eq!(seen.len(), 7);

        let past_end = app
            .get(&format!("{}?page=4&page_size=3", routes::FILES))
            .await;
        assert_eq!(past_end.status, 200);
        assert!(past_end.body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_zero_rejected() {
        let app = seeded().await;

        let res = app.get(&format!("{}?page=0", routes::FILES)).await;
        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn page_beyond_any_offset_is_empty() {
        let app = seeded().await;

        let res = app
            .get(&format!("{}?page={}", routes::FILES, u64::MAX))
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["pagination"]["total"], 4);
        assert_eq!(res.body["pagination"]["has_next"], false);
        assert!(res.body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_size_is_clamped() {
        let app = seeded().await;

        let res = app.get(&format!("{}?page_size=1000", routes::FILES)).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["per_page"], 100);
    }

    #[tokio::test]
    async fn empty_catalog_lists_nothing() {
        let app = TestApp::spawn().await;

        let res = app.get(routes::FILES).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 0);
        assert_eq!(res.body["pagination"]["has_next"], false);
        assert!(res.body["data"].as_array().unwrap().is_empty());
    }
}

mod catalog_views {
    use super::*;

    #[tokio::test]
    async fn file_types_are_distinct_and_sorted() {
        let app = seeded().await;

        let res = app.get(routes::FILE_TYPES).await;
        assert_eq!(res.status, 200);
        assert_eq!(
            res.body["file_types"],
            serde_json::json!(["image/png", "text/plain"])
        );
    }

    #[tokio::test]
    async fn duplicates_lists_shared_content_only() {
        let app = seeded().await;

        let res = app
            .get(&format!("{}?sort_by=filename", routes::DUPLICATES))
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(
            filenames(&res.body),
            vec!["Report-copy.txt", "report-2024.txt"]
        );
    }
}
