//! ============================================================================
//! Task Catalog - Seeded task definitions
//! ============================================================================
//! The launch catalog for the miniapp. Definitions are inserted once at
//! startup; operators toggle availability via `set_task_active`.
//! ============================================================================

use crate::db::types::TaskDefinition;
use crate::types::{Reward, VerificationKind};

/// The launch task catalog
pub fn default_catalog() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition {
            id: 1,
            title: "Arkadaşını davet et".to_string(),
            description: "Davet bağlantınla bir arkadaşını OnlyVips'e getir.".to_string(),
            reward_text: "Davetçi rozeti".to_string(),
            reward: Reward::Badge("Davetçi".to_string()),
            verification: VerificationKind::Referral,
            verification_required: true,
            is_active: true,
        },
        TaskDefinition {
            id: 2,
            title: "Profilini tamamla".to_string(),
            description: "Profil fotoğrafı ve kullanıcı adını ekle.".to_string(),
            reward_text: "10 XP".to_string(),
            reward: Reward::Xp(10),
            verification: VerificationKind::ManualReview,
            verification_required: false,
            is_active: true,
        },
        TaskDefinition {
            id: 3,
            title: "Telegram kanalına katıl".to_string(),
            description: "Resmi OnlyVips duyuru kanalına katıl.".to_string(),
            reward_text: "20 XP".to_string(),
            reward: Reward::Xp(20),
            verification: VerificationKind::ChannelJoin,
            verification_required: true,
            is_active: true,
        },
        TaskDefinition {
            id: 4,
            title: "Tanıtım gönderisini ilet".to_string(),
            description: "Sabitlenmiş gönderiyi bir sohbete ilet.".to_string(),
            reward_text: "5 yıldız".to_string(),
            reward: Reward::Stars(5),
            verification: VerificationKind::ForwardMessage,
            verification_required: true,
            is_active: true,
        },
        TaskDefinition {
            id: 5,
            title: "İlk içeriğini keşfet".to_string(),
            description: "Herhangi bir showcu profilinden bir içerik aç.".to_string(),
            reward_text: "5 XP".to_string(),
            reward: Reward::Xp(5),
            verification: VerificationKind::ManualReview,
            verification_required: false,
            is_active: true,
        },
    ]
}
