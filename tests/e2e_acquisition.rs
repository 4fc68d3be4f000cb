//! End-to-end acquisition tests against a local HTTP server

mod helper;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mockito::Matcher;
use reqwest::Url;

use helper::{
    create_test_cache, create_test_context, create_test_tracker, gzip, jar, seed_cache,
    server_url,
};
use versioned_fetch::cache::ResourceCache;
use versioned_fetch::config::FetchConfig;
use versioned_fetch::http::VERSION_ID_HEADER;
use versioned_fetch::http::probe::AuthenticationHook;
use versioned_fetch::initializer::{InitializationResult, ResourceInitializer};
use versioned_fetch::resource::{DownloadOptions, Resource, ResourceStatus, UpdatePolicy};
use versioned_fetch::version::{VersionId, VersionString};
use versioned_fetch::FetchContext;

fn version(s: &str) -> Option<VersionString> {
    Some(VersionString::parse(s).unwrap())
}

#[tokio::test(flavor = "multi_thread")]
async fn exact_version_is_downloaded_once_then_served_from_cache() {
    let mut server = mockito::Server::new_async().await;
    let head = server
        .mock("HEAD", "/lib/app__V1.0.jar")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let get = server
        .mock("GET", "/lib/app__V1.0.jar")
        .with_status(200)
        .with_body("version one")
        .expect(1)
        .create_async()
        .await;

    let (_dir, cache) = create_test_cache();
    let location = server_url(&server, "/lib/app.jar");
    let options = DownloadOptions::new(false, true);

    // First session: nothing cached yet
    let context = create_test_context(cache.clone(), &FetchConfig::default());
    let tracker = create_test_tracker(context, options);
    tracker.add_resource(&location, version("1.0")).unwrap();
    let file = tracker.get_cache_file(&location).await.unwrap().unwrap();
    assert_eq!(std::fs::read(&file).unwrap(), b"version one");
    assert!(
        cache
            .is_cached(&location, Some(&VersionId::parse("1.0").unwrap()))
            .unwrap()
    );

    // Second session: served from the cache without touching the server
    let tracker = create_test_tracker(
        create_test_context(cache.clone(), &FetchConfig::default()),
        options,
    );
    tracker.add_resource(&location, version("1.0")).unwrap();
    let cached = tracker.get_cache_file(&location).await.unwrap();

    assert_eq!(cached, Some(file));
    head.assert_async().await;
    get.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn range_request_is_served_from_cache_when_remote_is_unchanged() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("HEAD", "/lib/app.jar")
        .match_query(Matcher::UrlEncoded("version-id".into(), "1.0+".into()))
        .with_status(200)
        .with_header(VERSION_ID_HEADER, "1.0")
        .create_async()
        .await;
    let get = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (_dir, cache) = create_test_cache();
    let location = server_url(&server, "/lib/app.jar");
    seed_cache(&cache, &location, Some("1.0"), b"cached one");
    let tracker = create_test_tracker(
        create_test_context(cache.clone(), &FetchConfig::default()),
        DownloadOptions::NONE,
    );
    tracker.add_resource(&location, version("1.0+")).unwrap();

    let file = tracker.get_cache_file(&location).await.unwrap().unwrap();

    assert_eq!(std::fs::read(file).unwrap(), b"cached one");
    get.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn pack200_encoded_resource_is_stored_as_jar() {
    let mut server = mockito::Server::new_async().await;
    let content = jar(&[("com/example/App.class", "bytecode")]);
    server
        .mock("HEAD", "/lib/app.jar.pack.gz")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("GET", "/lib/app.jar.pack.gz")
        .with_status(200)
        .with_header("content-encoding", "pack200-gzip")
        .with_body(gzip(&content))
        .create_async()
        .await;

    let (_dir, cache) = create_test_cache();
    let location = server_url(&server, "/lib/app.jar");
    let tracker = create_test_tracker(
        create_test_context(cache.clone(), &FetchConfig::default()),
        DownloadOptions::new(true, false),
    );
    tracker.add_resource(&location, None).unwrap();

    let file = tracker.get_cache_file(&location).await.unwrap().unwrap();

    assert_eq!(std::fs::read(file).unwrap(), content);
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_miss_marks_error_without_failing() {
    let (_dir, cache) = create_test_cache();
    let config = FetchConfig {
        offline: true,
        ..FetchConfig::default()
    };
    let context = create_test_context(cache, &config);
    let location = Url::parse("http://127.0.0.1:1/lib/app.jar").unwrap();
    let resource = Resource::new(
        location,
        version("1.0"),
        DownloadOptions::NONE,
        UpdatePolicy::Always,
    );

    let initializer = ResourceInitializer::for_resource(&resource, &context);
    let result = initializer.init(&resource, &context).await.unwrap();

    assert_eq!(initializer, ResourceInitializer::Offline);
    assert_eq!(result, InitializationResult::NoDownloadNeeded);
    assert_eq!(resource.status(), ResourceStatus::Error);
}

/// Accepts every login and counts the prompts
#[derive(Default)]
struct CountingLogin {
    prompts: AtomicUsize,
}

#[async_trait::async_trait]
impl AuthenticationHook for CountingLogin {
    async fn authenticate(&self, _url: &Url) -> bool {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn captive_portal_is_passed_after_login() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("HEAD", "/lib/app.jar")
        .with_status(511)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("HEAD", "/lib/app.jar")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("GET", "/lib/app.jar")
        .with_status(200)
        .with_body("behind the portal")
        .create_async()
        .await;

    let (_dir, cache) = create_test_cache();
    let login = Arc::new(CountingLogin::default());
    let context = FetchContext::new(cache, &FetchConfig::default())
        .unwrap()
        .with_authentication_hook(login.clone())
        .unwrap();
    let location = server_url(&server, "/lib/app.jar");
    let tracker = create_test_tracker(Arc::new(context), DownloadOptions::NONE);
    tracker.add_resource(&location, None).unwrap();

    let file = tracker.get_cache_file(&location).await.unwrap().unwrap();

    assert_eq!(std::fs::read(file).unwrap(), b"behind the portal");
    assert_eq!(login.prompts.load(Ordering::SeqCst), 1);
}
