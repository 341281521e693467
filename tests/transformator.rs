use std::collections::BTreeMap;
use std::sync::Arc;

use mockall::Sequence;
use tokio_util::sync::CancellationToken;
use url::Url;

use page_transform::contract::{
    MockMappingProvider, MockPageGenerator, MockPostTransformation, MockPreTransformation,
    MockSourceProvider, MockTargetContext, MockTargetPageUriResolver, MockTelemetrySink,
    PageTransformator, TargetContext, TargetPageUriResolver,
};
use page_transform::error::TransformationError;
use page_transform::model::{PageTransformationTask, SourceItem, SourceItemId, SourcePageKind};
use page_transform::options::PageTransformationOptions;
use page_transform::page::{MappingProviderOutput, PageGeneratorOutput};
use page_transform::telemetry::TransformationOutcome;
use page_transform::transformator::{DefaultPageTransformator, DefaultTargetPageUriResolver};

const SITE: &str = "https://contoso.example/sites/intranet/";

fn source_item(id: &str) -> SourceItem {
    SourceItem {
        id: SourceItemId::new(id),
        name: "Home.aspx".to_string(),
        url: "/sites/classic/SitePages/Home.aspx".to_string(),
        title: Some("Home".to_string()),
        kind: SourcePageKind::WikiPage,
        page_layout: Some("OneColumn".to_string()),
        web_parts: vec![],
        fields: BTreeMap::new(),
        author: None,
        editor: None,
        created: None,
        modified: None,
        is_home_page: false,
        role_assignments: vec![],
    }
}

fn source() -> MockSourceProvider {
    let mut source = MockSourceProvider::new();
    source
        .expect_get_item()
        .returning(|id, _| Ok(source_item(id.as_str())));
    source
}

fn target() -> Arc<MockTargetContext> {
    let mut target = MockTargetContext::new();
    target
        .expect_site_url()
        .return_const(Url::parse(SITE).unwrap());
    Arc::new(target)
}

fn task(source: MockSourceProvider) -> PageTransformationTask {
    PageTransformationTask::new(Arc::new(source), "7".into(), target())
}

fn mapping() -> MockMappingProvider {
    let mut mapping = MockMappingProvider::new();
    mapping
        .expect_map()
        .returning(|_, _| Ok(MappingProviderOutput::default()));
    mapping
}

fn generator() -> MockPageGenerator {
    let mut generator = MockPageGenerator::new();
    generator.expect_generate().returning(|_, _, uri, _| {
        Ok(PageGeneratorOutput {
            generated_page_url: uri.clone(),
            telemetry_properties: BTreeMap::new(),
        })
    });
    generator
}

fn transformator(
    mapping: MockMappingProvider,
    generator: MockPageGenerator,
) -> DefaultPageTransformator {
    DefaultPageTransformator::new(
        Arc::new(PageTransformationOptions::default()),
        Arc::new(mapping),
        Arc::new(generator),
    )
}

#[tokio::test]
async fn test_stages_run_in_order_and_return_generated_url() {
    let mut seq = Sequence::new();
    let mut pre = MockPreTransformation::new();
    let mut mapping = MockMappingProvider::new();
    let mut generator = MockPageGenerator::new();
    let mut post = MockPostTransformation::new();

    pre.expect_pre_transform()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    mapping
        .expect_map()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|context, _| {
            assert_eq!(context.source_item.id.as_str(), "7");
            Ok(MappingProviderOutput::default())
        });
    generator
        .expect_generate()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, uri, _| {
            Ok(PageGeneratorOutput {
                generated_page_url: uri.clone(),
                telemetry_properties: BTreeMap::new(),
            })
        });
    post.expect_post_transform()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| Ok(()));

    let mut telemetry = MockTelemetrySink::new();
    telemetry
        .expect_record()
        .withf(|t| t.outcome == TransformationOutcome::Succeeded && t.source_item_id.as_str() == "7")
        .times(1)
        .return_const(());

    let transformator = transformator(mapping, generator)
        .with_pre_transformation(Arc::new(pre))
        .with_post_transformation(Arc::new(post))
        .with_telemetry_sink(Arc::new(telemetry));

    let url = transformator
        .transform(&task(source()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        url.as_str(),
        "https://contoso.example/sites/intranet/SitePages/Migrated_Home.aspx"
    );
}

#[tokio::test]
async fn test_explicit_target_uri_bypasses_resolver() {
    let explicit = Url::parse("https://contoso.example/sites/intranet/SitePages/Pinned.aspx").unwrap();
    let mut resolver = MockTargetPageUriResolver::new();
    resolver.expect_resolve().times(0);

    let transformator =
        transformator(mapping(), generator()).with_target_page_uri_resolver(Arc::new(resolver));
    let task = task(source()).with_target_page_uri(explicit.clone());

    let url = transformator
        .transform(&task, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(url, explicit);
}

#[tokio::test]
async fn test_cancelled_token_stops_before_fetching() {
    let mut source = MockSourceProvider::new();
    source.expect_get_item().times(0);
    let mut mapping = MockMappingProvider::new();
    mapping.expect_map().times(0);

    let token = CancellationToken::new();
    token.cancel();
    let err = transformator(mapping, generator())
        .transform(&task(source), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancellation());
}

#[tokio::test]
async fn test_cancellation_during_pre_hook_skips_mapping() {
    let token = CancellationToken::new();
    let hook_token = token.clone();
    let mut pre = MockPreTransformation::new();
    pre.expect_pre_transform().returning(move |_, _| {
        hook_token.cancel();
        Ok(())
    });
    let mut mapping = MockMappingProvider::new();
    mapping.expect_map().times(0);
    let mut telemetry = MockTelemetrySink::new();
    telemetry.expect_record().times(0);

    let err = transformator(mapping, generator())
        .with_pre_transformation(Arc::new(pre))
        .with_telemetry_sink(Arc::new(telemetry))
        .transform(&task(source()), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancellation());
}

#[tokio::test]
async fn test_failing_pre_hook_fails_task_and_records_failure() {
    let mut first = MockPreTransformation::new();
    first
        .expect_pre_transform()
        .returning(|_, _| Err(TransformationError::MissingArgument("page owner")));
    let mut second = MockPreTransformation::new();
    second.expect_pre_transform().times(0);
    let mut mapping = MockMappingProvider::new();
    mapping.expect_map().times(0);
    let mut telemetry = MockTelemetrySink::new();
    telemetry
        .expect_record()
        .withf(|t| matches!(t.outcome, TransformationOutcome::Failed { .. }))
        .times(1)
        .return_const(());

    let err = transformator(mapping, generator())
        .with_pre_transformation(Arc::new(first))
        .with_pre_transformation(Arc::new(second))
        .with_telemetry_sink(Arc::new(telemetry))
        .transform(&task(source()), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransformationError::Hook { .. }));
    assert!(err.to_string().contains("page owner"));
}

#[tokio::test]
async fn test_skip_telemetry_records_nothing() {
    let mut telemetry = MockTelemetrySink::new();
    telemetry.expect_record().times(0);
    let options = PageTransformationOptions {
        skip_telemetry: true,
        ..Default::default()
    };
    let transformator =
        DefaultPageTransformator::new(Arc::new(options), Arc::new(mapping()), Arc::new(generator()))
            .with_telemetry_sink(Arc::new(telemetry));

    transformator
        .transform(&task(source()), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_resolver_places_page_in_folder() {
    let options = PageTransformationOptions {
        target_page_folder: Some("/News/".to_string()),
        ..Default::default()
    };
    let resolver = DefaultTargetPageUriResolver::new(Arc::new(options));
    let mut site = MockTargetContext::new();
    site.expect_site_url()
        .return_const(Url::parse("https://contoso.example/sites/intranet").unwrap());
    let site: Arc<dyn TargetContext> = Arc::new(site);

    let url = resolver
        .resolve(&source_item("1"), &site, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        url.as_str(),
        "https://contoso.example/sites/intranet/SitePages/News/Migrated_Home.aspx"
    );
}

#[tokio::test]
async fn test_resolver_keeps_source_name_when_asked() {
    let options = PageTransformationOptions {
        target_page_takes_source_page_name: true,
        ..Default::default()
    };
    let resolver = DefaultTargetPageUriResolver::new(Arc::new(options));
    assert_eq!(resolver.page_name(&source_item("1")), "Home.aspx");
}
