//! Property tests for the synthesized permission surface.
//!
//! Whatever the stack name, account, or region, the least-privilege split
//! between the two function roles must hold, and no policy may fall back to
//! a wildcard resource.

use proptest::prelude::*;

use ragstack::domain::models::{Config, StackSpec};

fn spec_strategy() -> impl Strategy<Value = StackSpec> {
    (
        "[a-z][a-z0-9-]{0,15}",
        "[0-9]{12}",
        prop_oneof![
            Just("us-east-1".to_string()),
            Just("us-west-2".to_string()),
            Just("eu-west-1".to_string()),
            Just("ap-southeast-2".to_string()),
        ],
    )
        .prop_map(|(name, account, region)| {
            let mut config = Config::default();
            config.stack.name = name;
            StackSpec::from_config(&config, &account, &region)
        })
}

proptest! {
    #[test]
    fn ingestion_role_never_holds_model_invocation(spec in spec_strategy()) {
        let kb_arn = spec.knowledge_base_arn("KBTEST");
        let policy = spec.ingestion_role_policy(&kb_arn);

        prop_assert!(policy.actions().all(|a| a != "bedrock:InvokeModel"));
        prop_assert!(policy.actions().all(|a| a != "bedrock:Retrieve"));
    }

    #[test]
    fn retrieval_role_never_holds_ingestion_control(spec in spec_strategy()) {
        let kb_arn = spec.knowledge_base_arn("KBTEST");
        let table_arn = spec.conversations_table.arn(&spec.account_id, &spec.region);
        let policy = spec.retrieval_role_policy(&kb_arn, &table_arn);

        prop_assert!(policy.actions().all(|a| !a.contains("IngestionJob")));
    }

    #[test]
    fn no_policy_grants_bare_wildcard_resources(spec in spec_strategy()) {
        let kb_arn = spec.knowledge_base_arn("KBTEST");
        let table_arn = spec.conversations_table.arn(&spec.account_id, &spec.region);
        let collection_arn = format!(
            "arn:aws:aoss:{}:{}:collection/test",
            spec.region, spec.account_id
        );

        for policy in [
            spec.kb_role_policy(&collection_arn),
            spec.ingestion_role_policy(&kb_arn),
            spec.retrieval_role_policy(&kb_arn, &table_arn),
        ] {
            for resource in policy.resources() {
                prop_assert_ne!(resource, "*");
                prop_assert!(resource.starts_with("arn:aws:"));
            }
        }
    }

    #[test]
    fn policies_are_scoped_to_this_stack_account(spec in spec_strategy()) {
        let kb_arn = spec.knowledge_base_arn("KBTEST");
        let table_arn = spec.conversations_table.arn(&spec.account_id, &spec.region);
        let policy = spec.retrieval_role_policy(&kb_arn, &table_arn);

        // Regional ARNs name this account; only foundation-model and S3
        // ARNs are account-less by the provider's grammar.
        for resource in policy.resources() {
            let account_less = (resource.contains(":bedrock:")
                && resource.contains("::foundation-model/"))
                || resource.starts_with("arn:aws:s3:::");
            prop_assert!(
                account_less || resource.contains(&spec.account_id),
                "resource {} names a foreign account", resource
            );
        }
    }

    #[test]
    fn bucket_name_is_parameterized_on_account_and_region(spec in spec_strategy()) {
        prop_assert!(spec.bucket.name.contains(&spec.account_id));
        prop_assert!(spec.bucket.name.contains(&spec.region));
    }

    #[test]
    fn notification_rules_accept_exactly_filtered_documents(
        spec in spec_strategy(),
        stem in "[a-z0-9]{1,20}",
    ) {
        let pdf_key = format!("documents/{stem}.pdf");
        let txt_key = format!("documents/{stem}.txt");
        let docx_key = format!("documents/{stem}.docx");
        let unprefixed = format!("{stem}.pdf");

        prop_assert!(spec.notifications.iter().any(|r| r.matches(&pdf_key)));
        prop_assert!(spec.notifications.iter().any(|r| r.matches(&txt_key)));
        prop_assert!(spec.notifications.iter().all(|r| !r.matches(&docx_key)));
        prop_assert!(spec.notifications.iter().all(|r| !r.matches(&unprefixed)));
    }
}
