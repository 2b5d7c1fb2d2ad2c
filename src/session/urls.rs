/// 教务系统入口：校内网段前缀 + VPN 端口号拼出本次会话的基础地址
pub fn base_url(host_prefix: &str, port: &str) -> String {
    format!("http://{}{}/jwglxt", host_prefix, port)
}

/// 选课提交 api
pub fn select_course_api(base_url: &str) -> String {
    format!(
        "{}/xsxk/zzxkyzbjk_xkBcZyZzxkYzb.html?gnmkdm=N253512",
        base_url
    )
}

/// 选课首页（从中解析 xkkz_id）
pub fn index_url(base_url: &str) -> String {
    format!(
        "{}/xsxk/zzxkyzb_cxZzxkYzbIndex.html?gnmkdm=N253512&layout=default",
        base_url
    )
}

/// 获取教学班 ids 的 api
pub fn jxb_ids_api(base_url: &str) -> String {
    format!(
        "{}/xsxk/zzxkyzbjk_cxJxbWithKchZzxkYzb.html?gnmkdm=N253512",
        base_url
    )
}
