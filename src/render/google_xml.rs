//! Google Shopping RSS 2.0 feed.

use std::fmt::Write as _;

use super::{FeedItem, RenderContext};

pub const GOOGLE_NAMESPACE: &str = "http://base.google.com/ns/1.0";
pub const MAX_TITLE_CHARS: usize = 150;

/// Renders items as an RSS 2.0 document in the `g:` namespace.
///
/// Free text goes in CDATA; everything else is entity-escaped. The document carries no
/// timestamps, so identical inputs produce identical bytes.
pub fn render_xml(ctx: &RenderContext, items: &[FeedItem]) -> Vec<u8> {
    let mut out = String::with_capacity(512 + items.len() * 1024);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(out, "<rss version=\"2.0\" xmlns:g=\"{GOOGLE_NAMESPACE}\">");
    out.push_str("<channel>\n");
    let _ = writeln!(out, "<title>{}</title>", cdata(&ctx.feed_name));
    let _ = writeln!(out, "<link>{}</link>", escape(&ctx.storefront_base));
    let _ = writeln!(
        out,
        "<description>{}</description>",
        cdata(&format!("Product feed: {}", ctx.feed_name))
    );

    for item in items {
        write_item(&mut out, item);
    }

    out.push_str("</channel>\n</rss>\n");
    out.into_bytes()
}

fn write_item(out: &mut String, item: &FeedItem) {
    out.push_str("<item>\n");
    element(out, "g:id", &escape(&item.id));
    element(out, "g:title", &cdata(&item.title));
    element(out, "g:description", &cdata(&item.description));
    element(out, "g:link", &escape(&item.link));
    element(out, "g:image_link", &escape(&item.image_link));
    element(out, "g:condition", &escape(&item.condition));
    element(out, "g:availability", item.availability);
    element(out, "g:price", &escape(&item.price));

    if let Some(brand) = &item.brand {
        element(out, "g:brand", &cdata(brand));
    }
    if let Some(gtin) = &item.gtin {
        element(out, "g:gtin", &escape(gtin));
    }
    if let Some(mpn) = &item.mpn {
        element(out, "g:mpn", &escape(mpn));
    }
    if let Some(category) = &item.google_product_category {
        element(out, "g:google_product_category", &cdata(category));
    }
    if let Some(product_type) = &item.product_type {
        element(out, "g:product_type", &cdata(product_type));
    }
    if let Some(group) = &item.item_group_id {
        element(out, "g:item_group_id", &escape(group));
    }
    for image in &item.additional_images {
        element(out, "g:additional_image_link", &escape(image));
    }
    out.push_str("</item>\n");
}

fn element(out: &mut String, name: &str, content: &str) {
    let _ = writeln!(out, "<{name}>{content}</{name}>");
}

/// Wraps text in CDATA, splitting any `]]>` so the section cannot be closed early.
fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{ctx, product};
    use super::super::feed_items;
    use super::*;
    use serde_json::json;

    fn render(products: &[crate::models::product::Model]) -> String {
        let ctx = ctx();
        String::from_utf8(render_xml(&ctx, &feed_items(&ctx, products))).unwrap()
    }

    #[test]
    fn curated_set_renders_three_items() {
        let mut two_images = product("1", "Blue Jeans", "49.50");
        two_images.images = json!(["https://img/jeans-1.jpg", "https://img/jeans-2.jpg"]);
        let no_images = product("2", "Plain Socks", "5");
        let mut handled = product("3", "Red Shirt", "24.99");
        handled.images = json!(["https://img/shirt.jpg"]);
        handled.metadata = Some(json!({"handle": "red-shirt"}));

        let xml = render(&[two_images, no_images, handled]);

        assert!(xml.contains("xmlns:g=\"http://base.google.com/ns/1.0\""));
        assert_eq!(xml.matches("<item>").count(), 3);
        assert_eq!(xml.matches("placeholder.png").count(), 1);
        assert!(xml.contains(
            "<g:link>https://shop.example.com/products/red-shirt</g:link>"
        ));
        assert!(xml.contains("<g:additional_image_link>https://img/jeans-2.jpg</g:additional_image_link>"));
        assert!(xml.contains("<g:price>24.99 USD</g:price>"));
    }

    #[test]
    fn free_text_is_wrapped_in_cdata() {
        let mut p = product("1", "Fish & Chips <Deluxe>", "10");
        p.description = Some("ends with ]]> marker".into());
        let xml = render(&[p]);
        assert!(xml.contains("<g:title><![CDATA[Fish & Chips <Deluxe>]]></g:title>"));
        assert!(xml.contains("]]]]><![CDATA[>"));
    }

    #[test]
    fn non_text_fields_are_escaped() {
        let mut p = product("a&b", "Shirt", "10");
        p.metadata = Some(json!({"handle": "x\"y"}));
        let xml = render(&[p]);
        assert!(xml.contains("<g:id>a&amp;b</g:id>"));
        assert!(xml.contains("/products/x&quot;y</g:link>"));
    }

    #[test]
    fn rendering_is_byte_stable() {
        let products = vec![product("1", "Shirt", "10"), product("2", "Hat", "12")];
        assert_eq!(render(&products), render(&products));
    }
}
