//! Unit tests for the document store

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::types::Article;
    use chrono::{Duration, Utc};

    fn article(id: &str, org: &str, target: &str) -> Article {
        Article {
            id: id.to_string(),
            organization_slug: org.to_string(),
            source_id: "src-1".to_string(),
            target_id: target.to_string(),
            title: "Title".to_string(),
            body: "Body".to_string(),
            url: None,
            published_at: Utc::now(),
            is_test: false,
            scenario_id: None,
        }
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let db = Database::in_memory().await.unwrap();
        let a = article("a1", "acme", "t1");
        db.put(&a).await.unwrap();

        let got: Article = db.get("acme", "a1").await.unwrap().unwrap();
        assert_eq!(got.id, "a1");
        assert_eq!(got.target_id, "t1");
    }

    #[tokio::test]
    async fn put_is_upsert() {
        let db = Database::in_memory().await.unwrap();
        let mut a = article("a1", "acme", "t1");
        db.put(&a).await.unwrap();
        a.title = "Updated".to_string();
        db.put(&a).await.unwrap();

        let got: Article = db.get("acme", "a1").await.unwrap().unwrap();
        assert_eq!(got.title, "Updated");
        assert_eq!(db.count::<Article>("acme", &DocFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cross_org_lookup_is_none() {
        let db = Database::in_memory().await.unwrap();
        db.put(&article("a1", "acme", "t1")).await.unwrap();

        let other: Option<Article> = db.get("rival", "a1").await.unwrap();
        assert!(other.is_none());
        assert!(db
            .list::<Article>("rival", &DocFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_target_and_test_flag() {
        let db = Database::in_memory().await.unwrap();
        db.put(&article("a1", "acme", "t1")).await.unwrap();
        db.put(&article("a2", "acme", "t2")).await.unwrap();
        let mut test_article = article("a3", "acme", "t1");
        test_article.is_test = true;
        db.put(&test_article).await.unwrap();

        let t1: Vec<Article> = db
            .list("acme", &DocFilter::default().target("t1"))
            .await
            .unwrap();
        assert_eq!(t1.len(), 2);

        let prod_t1: Vec<Article> = db
            .list("acme", &DocFilter::default().target("t1").test(false))
            .await
            .unwrap();
        assert_eq!(prod_t1.len(), 1);
        assert_eq!(prod_t1[0].id, "a1");
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_paginates() {
        let db = Database::in_memory().await.unwrap();
        let base = Utc::now();
        for i in 0..5 {
            let mut a = article(&format!("a{}", i), "acme", "t1");
            a.published_at = base - Duration::hours(i);
            db.put(&a).await.unwrap();
        }

        let all: Vec<Article> = db.list("acme", &DocFilter::default()).await.unwrap();
        assert_eq!(all[0].id, "a0");
        assert_eq!(all[4].id, "a4");

        let page: Vec<Article> = db
            .list("acme", &DocFilter::default().limit(2).offset(2))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "a2");
    }

    #[tokio::test]
    async fn time_window_filters() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();
        let mut old = article("old", "acme", "t1");
        old.published_at = now - Duration::days(3);
        db.put(&old).await.unwrap();
        db.put(&article("fresh", "acme", "t1")).await.unwrap();

        let recent: Vec<Article> = db
            .list("acme", &DocFilter::default().after(now - Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "fresh");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.put(&article("a1", "acme", "t1")).await.unwrap();

        db.delete::<Article>("acme", "a1").await.unwrap();
        // Already gone: still success.
        db.delete::<Article>("acme", "a1").await.unwrap();
        assert!(db.get::<Article>("acme", "a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_where_reports_rows_removed() {
        let db = Database::in_memory().await.unwrap();
        for i in 0..3 {
            let mut a = article(&format!("a{}", i), "acme", "t1");
            a.scenario_id = Some("scn-1".to_string());
            db.put(&a).await.unwrap();
        }
        db.put(&article("keep", "acme", "t1")).await.unwrap();

        let filter = DocFilter::default().scenario("scn-1");
        let removed = db
            .delete_where(Table::Articles, "acme", &filter)
            .await
            .unwrap();
        assert_eq!(removed, 3);
        let removed_again = db
            .delete_where(Table::Articles, "acme", &filter)
            .await
            .unwrap();
        assert_eq!(removed_again, 0);
        assert!(db.get::<Article>("acme", "keep").await.unwrap().is_some());
    }
}
