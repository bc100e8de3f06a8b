use criterion::{criterion_group, criterion_main, Criterion};
use relate_kernel_core::{suggest_duplicates, Channel, ChannelKind, Contact, ContactId, WorkspaceId};
use time::OffsetDateTime;

fn fixture_contacts(count: usize) -> Vec<Contact> {
    let workspace = WorkspaceId::new();
    let now = OffsetDateTime::UNIX_EPOCH;
    (0..count)
        .map(|index| Contact {
            id: ContactId::new(),
            workspace_id: workspace,
            name: format!("Contact Number {index}"),
            city: Some("Berlin".to_string()),
            tier: None,
            trust_score: None,
            introduced_by: None,
            aliases: vec![],
            tags: vec![],
            organizations: vec!["Acme".to_string()],
            communities: vec![],
            channels: vec![Channel::new(
                ChannelKind::Email,
                format!("contact{index}@example.com"),
                true,
            )],
            notes: vec![],
            created_at: now,
            updated_at: now,
        })
        .collect()
}

fn bench_suggest_duplicates(c: &mut Criterion) {
    let contacts = fixture_contacts(200);
    c.bench_function("suggest_duplicates_200", |b| {
        b.iter(|| suggest_duplicates(std::hint::black_box(&contacts)));
    });
}

criterion_group!(benches, bench_suggest_duplicates);
criterion_main!(benches);
