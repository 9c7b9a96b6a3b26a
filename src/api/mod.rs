pub mod mastodon;
