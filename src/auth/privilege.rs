//! 权限检查
//!
//! 权限以逗号分隔的字符串形式保存在令牌中（例如 `"ek_read_session,ek_write"`）。

/// 管理员权限，满足任意权限检查
pub const ADMIN_PRIVILEGE: &str = "ek_admin";
/// 查看会话与在线连接
pub const READ_SESSION: &str = "ek_read_session";
/// 删除会话
pub const DELETE_SESSION: &str = "ek_delete_session";

/// 判断权限列表是否包含目标权限
///
/// 逐项去除首尾空白后精确匹配；包含 [`ADMIN_PRIVILEGE`] 时总是返回 true。
pub fn has_privilege(privileges: &str, target: &str) -> bool {
    privileges
        .split(',')
        .map(str::trim)
        .any(|p| !p.is_empty() && (p == target || p == ADMIN_PRIVILEGE))
}
