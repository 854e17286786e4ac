use std::time::Duration;

use shared::{
    domain::{ChannelKind, Role, UserId},
    model::arrange_categories,
};
use storage::Storage;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn directory_and_membership_watches_follow_writes() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let owner = UserId::new("owner");
    let guest = UserId::new("guest");
    let server_id = storage
        .create_server("Rangkul", &owner, None)
        .await
        .expect("server");

    let mut directory = storage.watch_channel_directory(&server_id);
    let mut guest_servers = storage.watch_member_servers(&guest);

    let initial = directory.next().await.expect("snapshot").expect("ok");
    assert_eq!(initial.channels.len(), 1);
    assert!(guest_servers.next().await.expect("snapshot").expect("ok").is_empty());

    let voice = storage
        .create_category(&server_id, "VOICE")
        .await
        .expect("category");
    storage
        .create_channel(&server_id, "lounge", ChannelKind::Voice, Some(&voice))
        .await
        .expect("channel");

    let mut latest = initial;
    while latest.channels.len() < 2 {
        latest = tokio::time::timeout(SNAPSHOT_TIMEOUT, directory.next())
            .await
            .expect("timely directory snapshot")
            .expect("snapshot")
            .expect("ok");
    }
    let arranged = arrange_categories(&latest);
    assert_eq!(arranged[0].name, "VOICE");
    assert_eq!(arranged[0].channels[0].name, "lounge");
    assert_eq!(arranged[1].channels[0].name, "general");

    storage
        .add_member(&server_id, &guest, Role::Member)
        .await
        .expect("join");
    let joined = tokio::time::timeout(SNAPSHOT_TIMEOUT, guest_servers.next())
        .await
        .expect("timely membership snapshot")
        .expect("snapshot")
        .expect("ok");
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].name, "Rangkul");

    storage
        .remove_member(&server_id, &guest)
        .await
        .expect("leave");
    let left = tokio::time::timeout(SNAPSHOT_TIMEOUT, guest_servers.next())
        .await
        .expect("timely membership snapshot")
        .expect("snapshot")
        .expect("ok");
    assert!(left.is_empty());
}
