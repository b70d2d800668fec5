pub mod anchor_platform; // 锚点平台（外部对手方）客户端
pub mod reconciliation;
