use page_transform::model::{properties, WebPartEntity, WebPartType};
use page_transform::options::PageTransformationOptions;
use page_transform::splitter::{WikiSplitter, ORDER_HEADROOM};

fn wiki_text(row: u32, column: u32, order: u32, html: &str) -> WebPartEntity {
    WebPartEntity::new(WebPartType::WikiText, row, column, order).with_property(properties::TEXT, html)
}

#[test]
fn test_text_is_split_around_an_image() {
    let splitter = WikiSplitter::new(&PageTransformationOptions::default());
    let out = splitter.transform_plus_split(vec![wiki_text(
        1,
        1,
        1,
        r#"<p>Hello</p><img src="/i.png" alt="pic"><p>World</p>"#,
    )]);

    assert_eq!(out.len(), 3, "{out:#?}");
    assert_eq!(out[0].web_part_type, WebPartType::WikiText);
    assert_eq!(out[0].property(properties::TEXT), Some("<p>Hello</p>"));
    assert_eq!(out[1].web_part_type, WebPartType::WikiImage);
    assert_eq!(out[1].property(properties::IMAGE_URL), Some("/i.png"));
    assert_eq!(out[1].property(properties::ALTERNATIVE_TEXT), Some("pic"));
    assert_eq!(out[2].property(properties::TEXT), Some("<p>World</p>"));

    for wp in &out {
        assert_eq!((wp.row, wp.column), (1, 1));
    }
    assert!(out[0].order < out[1].order && out[1].order < out[2].order);
    assert_eq!(out[0].order, ORDER_HEADROOM);
}

#[test]
fn test_image_inside_paragraph_splits_the_paragraph() {
    let splitter = WikiSplitter::new(&PageTransformationOptions::default());
    let out = splitter.transform_plus_split(vec![wiki_text(
        2,
        1,
        0,
        r#"<p>before <img src="/a.png"> after</p>"#,
    )]);

    assert_eq!(out.len(), 3, "{out:#?}");
    assert_eq!(out[0].property(properties::TEXT), Some("<p>before </p>"));
    // The orphaned closing tag re-parses to an empty paragraph, which is stripped.
    assert_eq!(out[2].property(properties::TEXT), Some(" after"));
}

#[test]
fn test_iframe_becomes_video() {
    let splitter = WikiSplitter::new(&PageTransformationOptions::default());
    let out = splitter.transform_plus_split(vec![wiki_text(
        1,
        1,
        1,
        r#"<iframe src="https://videos.example/v/1"></iframe>"#,
    )]);

    assert_eq!(out.len(), 1, "{out:#?}");
    assert_eq!(out[0].web_part_type, WebPartType::WikiVideo);
    assert_eq!(
        out[0].property(properties::SOURCE),
        Some("https://videos.example/v/1")
    );
    assert!(out[0]
        .property(properties::IFRAME_EMBED)
        .unwrap()
        .starts_with("<iframe"));
}

#[test]
fn test_splitting_disabled_leaves_entities_alone() {
    let options = PageTransformationOptions {
        handle_wiki_images_and_videos: false,
        ..Default::default()
    };
    let input = vec![wiki_text(1, 1, 1, r#"<p>a</p><img src="/i.png"><p>b</p>"#)];
    let out = WikiSplitter::new(&options).transform_plus_split(input.clone());
    assert_eq!(out, input);
}

#[test]
fn test_list_image_stays_inline_without_append_option() {
    let options = PageTransformationOptions {
        add_table_list_image_as_image_web_part: false,
        ..Default::default()
    };
    let input = vec![wiki_text(1, 1, 1, r#"<ul><li><img src="/i.png"></li></ul>"#)];
    let out = WikiSplitter::new(&options).transform_plus_split(input.clone());
    assert_eq!(out, input);
}

#[test]
fn test_content_editor_with_content_link_is_not_split() {
    let wp = WebPartEntity::new(WebPartType::ContentEditor, 1, 1, 1)
        .with_property(properties::CONTENT, r#"<img src="/i.png">"#)
        .with_property(properties::CONTENT_LINK, "/SiteAssets/snippet.html");
    let out = WikiSplitter::new(&PageTransformationOptions::default())
        .transform_plus_split(vec![wp.clone()]);
    assert_eq!(out, vec![wp]);
}

fn placements(out: &[WebPartEntity]) -> Vec<(u32, u32, u32)> {
    out.iter().map(WebPartEntity::placement).collect()
}

fn assert_unique_and_ordered(out: &[WebPartEntity]) {
    let keys = placements(out);
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1], "placements out of order: {keys:?}");
    }
}

#[test]
fn test_split_entity_at_order_zero_does_not_collide_with_its_neighbour() {
    let splitter = WikiSplitter::new(&PageTransformationOptions::default());
    let out = splitter.transform_plus_split(vec![
        wiki_text(1, 1, 0, r#"<p>Hello</p><img src="a.png"><p>World</p>"#),
        WebPartEntity::new(WebPartType::ListView, 1, 1, 1),
    ]);

    assert_eq!(
        placements(&out),
        vec![(1, 1, 0), (1, 1, 1), (1, 1, 2), (1, 1, ORDER_HEADROOM)]
    );
    assert_eq!(out[3].web_part_type, WebPartType::ListView);
}

#[test]
fn test_splitting_keeps_entities_in_source_order() {
    let splitter = WikiSplitter::new(&PageTransformationOptions::default());
    let out = splitter.transform_plus_split(vec![
        wiki_text(1, 1, 1, r#"<p>a</p><img src="a.png"><p>b</p>"#),
        WebPartEntity::new(WebPartType::ListView, 1, 1, 2),
        wiki_text(1, 2, 1, "<p>side</p>"),
        wiki_text(2, 1, 1, r#"<img src="b.png"><p>c</p><img src="c.png">"#),
    ]);

    let types: Vec<WebPartType> = out.iter().map(|wp| wp.web_part_type).collect();
    assert_eq!(
        types,
        vec![
            WebPartType::WikiText,
            WebPartType::WikiImage,
            WebPartType::WikiText,
            WebPartType::ListView,
            WebPartType::WikiText,
            WebPartType::WikiImage,
            WebPartType::WikiText,
            WebPartType::WikiImage,
        ]
    );
    assert_unique_and_ordered(&out);
    assert_eq!(out[3].order, 2 * ORDER_HEADROOM);
    // Unsplit entities in other cells are rescaled too.
    assert_eq!(out[4].placement(), (1, 2, ORDER_HEADROOM));
}

#[test]
fn test_huge_orders_are_renumbered_instead_of_overflowing() {
    let splitter = WikiSplitter::new(&PageTransformationOptions::default());
    let out = splitter.transform_plus_split(vec![
        wiki_text(1, 1, 5_000_000, r#"<p>a</p><img src="a.png">"#),
        WebPartEntity::new(WebPartType::ListView, 1, 1, u32::MAX),
    ]);

    assert_eq!(out.len(), 3, "{out:#?}");
    assert_unique_and_ordered(&out);
    assert_eq!(out[2].web_part_type, WebPartType::ListView);
}

#[test]
fn test_huge_order_without_media_passes_through() {
    let input = vec![wiki_text(1, 1, u32::MAX, "<p>plain</p>")];
    let out = WikiSplitter::new(&PageTransformationOptions::default())
        .transform_plus_split(input.clone());
    assert_eq!(out, input);
}

#[test]
fn test_appended_table_images_follow_the_last_placement() {
    let options = PageTransformationOptions {
        add_table_list_image_as_image_web_part: true,
        ..Default::default()
    };
    let out = WikiSplitter::new(&options).transform_plus_split(vec![
        wiki_text(1, 1, 0, r#"<table><tr><td><img src="t.png"></td></tr></table>"#),
        wiki_text(1, 1, 1, r#"<p>x</p><img src="a.png">"#),
    ]);

    assert_unique_and_ordered(&out);
    let last = out.last().unwrap();
    assert_eq!(last.web_part_type, WebPartType::WikiImage);
    assert_eq!(last.property(properties::IMAGE_URL), Some("t.png"));
    assert_eq!(last.placement(), (1, 1, 2 * ORDER_HEADROOM));
}
