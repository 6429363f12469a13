//! Publication external link integration tests

mod common;

use crowd_common::Error;
use crowd_publications::PublicationExternalLink;
use test_log::test;
use uuid::Uuid;

use common::TestApp;

#[test(tokio::test)]
async fn test_links_are_scoped_to_their_publication() {
    let t = TestApp::new();
    let paper = Uuid::new_v4();
    let other = Uuid::new_v4();

    for link in ["https://arxiv.org/abs/1234.5678", "https://github.com/aicrowd/paper"] {
        let link = PublicationExternalLink::new(paper, link).unwrap();
        t.app.publication_links.create(&link).await.unwrap();
    }
    let unrelated = PublicationExternalLink::new(other, "https://example.com").unwrap();
    t.app.publication_links.create(&unrelated).await.unwrap();

    let links = t.app.publication_links.list_for_publication(paper).await.unwrap();
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|l| l.publication_id == paper));
    assert_eq!(links[0].link, "https://arxiv.org/abs/1234.5678");
}

#[test]
fn test_blank_link_is_rejected() {
    assert!(matches!(
        PublicationExternalLink::new(Uuid::new_v4(), "   "),
        Err(Error::Validation(_))
    ));
}
