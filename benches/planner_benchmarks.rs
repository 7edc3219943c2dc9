use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use teleflux::config::{FolderMapping, PrivateFeedMode};
use teleflux::feed::{Category, Feed};
use teleflux::sync::title::sanitize_title;
use teleflux::sync::{DiffOptions, Plan, SyncDiff};
use teleflux::telegram::Channel;

const BASE: &str = "https://rsshub.example.com";
const FOLDERS: [&str; 4] = ["News", "Tech", "Science", "Culture"];

fn folders() -> FolderMapping {
    FolderMapping::new(FOLDERS.iter().map(|f| (*f, *f)))
}

/// Channels spread over the folders, a fifth of them also listed in a second folder
fn create_channels(count: usize) -> Vec<Channel> {
    let mut channels = Vec::with_capacity(count + count / 5);
    for i in 0..count {
        let folder = FOLDERS[i % FOLDERS.len()];
        let title = format!("📰 Channel {} 🚀", i);
        if i % 7 == 0 {
            channels.push(Channel::private(-100_000_000 - i as i64, title, folder, Some(format!("{:016x}", i))));
        } else {
            channels.push(Channel::public(i as i64, title.clone(), format!("Channel_{}", i), folder));
        }
        if i % 5 == 0 {
            let other = FOLDERS[(i + 1) % FOLDERS.len()];
            channels.push(Channel::public(i as i64, title, format!("Channel_{}", i), other));
        }
    }
    channels
}

/// Destination already holding half of the feeds, some in the wrong category
fn create_destination(count: usize) -> (Vec<Category>, Vec<Feed>) {
    let categories: Vec<Category> = FOLDERS
        .iter()
        .enumerate()
        .map(|(i, f)| Category {
            id: i as i64 + 1,
            title: f.to_string(),
        })
        .collect();

    let feeds = (0..count)
        .step_by(2)
        .map(|i| Feed {
            id: i as i64 + 1000,
            title: format!("Channel {}", i),
            feed_url: format!("{}/telegram/channel/channel_{}", BASE, i),
            category_id: ((i + i / 10) % FOLDERS.len()) as i64 + 1,
        })
        .collect();

    (categories, feeds)
}

fn options() -> DiffOptions {
    DiffOptions {
        rsshub_base_url: BASE.to_string(),
        configured_categories: FOLDERS.iter().map(|f| f.to_string()).collect(),
        update_titles: true,
        keep_emojis: false,
        remove_absent: true,
    }
}

fn bench_plan_build(c: &mut Criterion) {
    let folders = folders();
    let mut group = c.benchmark_group("plan_build");

    for &count in &[100, 1000, 5000] {
        let channels = create_channels(count);
        for mode in [PrivateFeedMode::Secret, PrivateFeedMode::Skip] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", mode).to_lowercase(), count),
                &channels,
                |b, channels| b.iter(|| black_box(Plan::build(channels, &folders, BASE, mode))),
            );
        }
    }

    group.finish();
}

fn bench_diff_compute(c: &mut Criterion) {
    let folders = folders();
    let options = options();
    let mut group = c.benchmark_group("diff_compute");

    for &count in &[100, 1000, 5000] {
        let channels = create_channels(count);
        let plan = Plan::build(&channels, &folders, BASE, PrivateFeedMode::Secret);
        let (categories, feeds) = create_destination(count);

        group.bench_with_input(BenchmarkId::new("compute", count), &plan, |b, plan| {
            b.iter(|| black_box(SyncDiff::compute(plan, &categories, &feeds, &options)))
        });
    }

    group.finish();
}

fn bench_sanitize_title(c: &mut Criterion) {
    let titles = [
        ("plain", "Daily Technology Digest"),
        ("emoji", "📰 Tech 🚀 News ✨ Today 🔥"),
        ("joiners", "Family 👨\u{200D}👩\u{200D}👧 Channel\u{FE0F}"),
        ("cjk", "科技新闻 📱 每日更新"),
    ];

    let mut group = c.benchmark_group("sanitize_title");
    for (name, title) in titles {
        group.bench_with_input(BenchmarkId::new("sanitize", name), &title, |b, title| {
            b.iter(|| black_box(sanitize_title(title)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan_build, bench_diff_compute, bench_sanitize_title);
criterion_main!(benches);
