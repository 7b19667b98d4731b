/// Per-user quota units charged by Gmail for each method
/// https://developers.google.com/gmail/api/reference/quota
pub struct GmailApiQuota {
    pub drafts_create: usize,
    pub get_profile: usize,
    pub history_list: usize,
    pub labels_create: usize,
    pub labels_delete: usize,
    pub labels_list: usize,
    pub messages_get: usize,
    pub messages_list: usize,
    pub messages_modify: usize,
    pub messages_send: usize,
    pub stop: usize,
    pub watch: usize,
}

pub const GMAIL_QUOTA_PER_SECOND: usize = 250;

pub const GMAIL_API_QUOTA: GmailApiQuota = GmailApiQuota {
    drafts_create: 10,
    get_profile: 1,
    history_list: 2,
    labels_create: 5,
    labels_delete: 5,
    labels_list: 1,
    messages_get: 5,
    messages_list: 5,
    messages_modify: 5,
    messages_send: 100,
    stop: 50,
    watch: 100,
};
