use std::collections::BTreeMap;
use std::str::FromStr;

use sea_orm::ActiveValue::{NotSet, Set};

use crate::errors::{ClickTrailError, Result};
use crate::storage::models::{
    Click, DeliveryStatus, DeviceInfo, Event, EventType, GeoInfo, HmacSettings, HttpMethod,
    NewDelivery, NewRetryJob, Offer, PostbackAuth, PostbackDelivery, PostbackProfile, RetryJob,
    Scope, UtmParams,
};
use migration::entities::{
    click, event, offer, postback_delivery, postback_profile, postback_retry_job,
};

/// 将 click Model 转换为 Click
pub fn model_to_click(model: click::Model) -> Click {
    let sub2_params: BTreeMap<String, String> = model
        .sub2_params
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    Click {
        click_id: model.click_id,
        campaign_id: model.campaign_id,
        offer_id: model.offer_id,
        flow_id: model.flow_id,
        source_id: model.source_id,
        subs: [
            model.sub1,
            model.sub2,
            model.sub3,
            model.sub4,
            model.sub5,
            model.sub6,
            model.sub7,
            model.sub8,
            model.sub9,
            model.sub10,
        ],
        sub2_params,
        utm: UtmParams {
            source: model.utm_source,
            medium: model.utm_medium,
            campaign: model.utm_campaign,
            term: model.utm_term,
            content: model.utm_content,
        },
        referrer: model.referrer,
        user_agent: model.user_agent,
        landing_url: model.landing_url,
        ip: model.ip,
        geo: GeoInfo {
            country_iso: model.country_iso,
            region: model.region,
            city: model.city,
            isp: model.isp,
            is_proxy: model.is_proxy,
        },
        device: DeviceInfo {
            browser_name: model.browser_name,
            browser_version: model.browser_version,
            os_name: model.os_name,
            os_version: model.os_version,
            device_type: model.device_type,
        },
        created_at: model.created_at,
    }
}

/// 将 Click 转换为 ActiveModel（仅插入）
pub fn click_to_active_model(click: &Click) -> click::ActiveModel {
    let [sub1, sub2, sub3, sub4, sub5, sub6, sub7, sub8, sub9, sub10] = click.subs.clone();

    let sub2_params = if click.sub2_params.is_empty() {
        None
    } else {
        serde_json::to_string(&click.sub2_params).ok()
    };

    click::ActiveModel {
        click_id: Set(click.click_id.clone()),
        campaign_id: Set(click.campaign_id.clone()),
        offer_id: Set(click.offer_id.clone()),
        flow_id: Set(click.flow_id.clone()),
        source_id: Set(click.source_id.clone()),
        sub1: Set(sub1),
        sub2: Set(sub2),
        sub3: Set(sub3),
        sub4: Set(sub4),
        sub5: Set(sub5),
        sub6: Set(sub6),
        sub7: Set(sub7),
        sub8: Set(sub8),
        sub9: Set(sub9),
        sub10: Set(sub10),
        sub2_params: Set(sub2_params),
        utm_source: Set(click.utm.source.clone()),
        utm_medium: Set(click.utm.medium.clone()),
        utm_campaign: Set(click.utm.campaign.clone()),
        utm_term: Set(click.utm.term.clone()),
        utm_content: Set(click.utm.content.clone()),
        referrer: Set(click.referrer.clone()),
        user_agent: Set(click.user_agent.clone()),
        landing_url: Set(click.landing_url.clone()),
        ip: Set(click.ip.clone()),
        country_iso: Set(click.geo.country_iso.clone()),
        region: Set(click.geo.region.clone()),
        city: Set(click.geo.city.clone()),
        isp: Set(click.geo.isp.clone()),
        is_proxy: Set(click.geo.is_proxy),
        browser_name: Set(click.device.browser_name.clone()),
        browser_version: Set(click.device.browser_version.clone()),
        os_name: Set(click.device.os_name.clone()),
        os_version: Set(click.device.os_version.clone()),
        device_type: Set(click.device.device_type.clone()),
        created_at: Set(click.created_at),
    }
}

/// 将 event Model 转换为 Event
pub fn model_to_event(model: event::Model) -> Result<Event> {
    let event_type = EventType::from_str(&model.event_type).map_err(|_| {
        ClickTrailError::serialization(format!(
            "事件 {} 的类型无效: {}",
            model.event_id, model.event_type
        ))
    })?;

    Ok(Event {
        event_id: model.event_id,
        click_id: model.click_id,
        event_type,
        revenue: model.revenue,
        currency: model.currency,
        txid: Some(model.txid).filter(|t| !t.is_empty()),
        time_on_page_ms: model.time_on_page_ms,
        created_at: model.created_at,
    })
}

/// 将 Event 转换为 ActiveModel（无 txid 时写入空字符串）
pub fn event_to_active_model(event: &Event) -> event::ActiveModel {
    event::ActiveModel {
        event_id: Set(event.event_id.clone()),
        click_id: Set(event.click_id.clone()),
        event_type: Set(event.event_type.as_ref().to_string()),
        revenue: Set(event.revenue),
        currency: Set(event.currency.clone()),
        txid: Set(event.txid.clone().unwrap_or_default()),
        time_on_page_ms: Set(event.time_on_page_ms),
        dispatched: Set(false),
        created_at: Set(event.created_at),
    }
}

pub fn model_to_offer(model: offer::Model) -> Offer {
    Offer {
        id: model.id,
        name: model.name,
        landing_url: model.landing_url,
        enabled: model.enabled,
        created_at: model.created_at,
    }
}

/// 解析参数模板
///
/// 存储格式为 `[[name, template], ...]` 以保持顺序，
/// 兼容 `{name: template}` 对象格式（按 key 排序）。
pub fn parse_params_template(raw: &str) -> Result<Vec<(String, String)>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<serde_json::Value>(trimmed)? {
        serde_json::Value::Array(_) => Ok(serde_json::from_str(trimmed)?),
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => Ok((k, s)),
                other => Ok((k, other.to_string())),
            })
            .collect(),
        serde_json::Value::Null => Ok(Vec::new()),
        other => Err(ClickTrailError::serialization(format!(
            "params_template 必须是数组或对象: {}",
            other
        ))),
    }
}

/// 将 profile Model 转换为 PostbackProfile
///
/// 作用域不合法（global 带 id 或非 global 缺 id）时返回错误。
pub fn model_to_profile(model: postback_profile::Model) -> Result<PostbackProfile> {
    let scope = Scope::from_parts(&model.scope_type, model.scope_id.as_deref()).ok_or_else(|| {
        ClickTrailError::validation(format!(
            "profile {} 的作用域无效: {} / {:?}",
            model.id, model.scope_type, model.scope_id
        ))
    })?;

    let method = HttpMethod::from_str(&model.method).map_err(|_| {
        ClickTrailError::validation(format!(
            "profile {} 的 HTTP 方法无效: {}",
            model.id, model.method
        ))
    })?;

    let params_template = parse_params_template(&model.params_template)?;
    let status_map: BTreeMap<String, String> = if model.status_map.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_json::from_str(&model.status_map)?
    };

    Ok(PostbackProfile {
        id: model.id,
        name: model.name,
        owner_id: model.owner_id,
        scope,
        priority: model.priority,
        enabled: model.enabled,
        method,
        endpoint_url_template: model.endpoint_url_template,
        params_template,
        body_template: model.body_template.filter(|b| !b.trim().is_empty()),
        status_map,
        filter_revenue_gt0: model.filter_revenue_gt0,
        auth: PostbackAuth {
            query_key: model.auth_query_key,
            query_val: model.auth_query_val,
            header_name: model.auth_header_name,
            header_val: model.auth_header_val,
        },
        hmac: HmacSettings {
            enabled: model.hmac_enabled,
            secret: model.hmac_secret,
            payload_template: model.hmac_payload_template,
            param_name: model.hmac_param_name,
        },
        retries: model.retries.max(1) as u32,
        backoff_base_sec: model.backoff_base_sec.max(0) as u32,
        timeout_ms: model.timeout_ms.max(1) as u64,
        url_encode: model.url_encode,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

/// 将 PostbackProfile 转换为 ActiveModel（id 为 0 时由数据库分配）
pub fn profile_to_active_model(profile: &PostbackProfile) -> Result<postback_profile::ActiveModel> {
    Ok(postback_profile::ActiveModel {
        id: if profile.id > 0 { Set(profile.id) } else { NotSet },
        name: Set(profile.name.clone()),
        owner_id: Set(profile.owner_id.clone()),
        scope_type: Set(profile.scope.scope_type().to_string()),
        scope_id: Set(profile.scope.scope_id().map(str::to_string)),
        priority: Set(profile.priority),
        enabled: Set(profile.enabled),
        method: Set(profile.method.to_string()),
        endpoint_url_template: Set(profile.endpoint_url_template.clone()),
        params_template: Set(serde_json::to_string(&profile.params_template)?),
        body_template: Set(profile.body_template.clone()),
        status_map: Set(serde_json::to_string(&profile.status_map)?),
        filter_revenue_gt0: Set(profile.filter_revenue_gt0),
        auth_query_key: Set(profile.auth.query_key.clone()),
        auth_query_val: Set(profile.auth.query_val.clone()),
        auth_header_name: Set(profile.auth.header_name.clone()),
        auth_header_val: Set(profile.auth.header_val.clone()),
        hmac_enabled: Set(profile.hmac.enabled),
        hmac_secret: Set(profile.hmac.secret.clone()),
        hmac_payload_template: Set(profile.hmac.payload_template.clone()),
        hmac_param_name: Set(profile.hmac.param_name.clone()),
        retries: Set(profile.retries.min(i32::MAX as u32) as i32),
        backoff_base_sec: Set(profile.backoff_base_sec.min(i32::MAX as u32) as i32),
        timeout_ms: Set(profile.timeout_ms.min(i32::MAX as u64) as i32),
        url_encode: Set(profile.url_encode),
        created_at: Set(profile.created_at),
        updated_at: Set(profile.updated_at),
    })
}

pub fn model_to_delivery(model: postback_delivery::Model) -> Result<PostbackDelivery> {
    let status = DeliveryStatus::from_str(&model.status).map_err(|_| {
        ClickTrailError::serialization(format!(
            "投递记录 {} 的状态无效: {}",
            model.id, model.status
        ))
    })?;

    Ok(PostbackDelivery {
        id: model.id,
        chain_id: model.chain_id,
        profile_id: model.profile_id,
        event_id: model.event_id,
        click_id: model.click_id,
        attempt: model.attempt.max(0) as u32,
        max_attempts: model.max_attempts.max(0) as u32,
        status,
        request_method: model.request_method,
        request_url: model.request_url,
        request_body: model.request_body,
        request_headers: model.request_headers,
        response_code: model.response_code.and_then(|c| u16::try_from(c).ok()),
        response_body: model.response_body,
        error: model.error,
        duration_ms: model.duration_ms.max(0) as u64,
        next_retry_at: model.next_retry_at,
        created_at: model.created_at,
    })
}

pub fn delivery_to_active_model(record: &NewDelivery) -> Result<postback_delivery::ActiveModel> {
    let request_headers = if record.request_headers.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&record.request_headers)?)
    };

    Ok(postback_delivery::ActiveModel {
        id: NotSet,
        chain_id: Set(record.chain_id.clone()),
        profile_id: Set(record.profile_id),
        event_id: Set(record.event_id.clone()),
        click_id: Set(record.click_id.clone()),
        attempt: Set(record.attempt as i32),
        max_attempts: Set(record.max_attempts as i32),
        status: Set(record.status.to_string()),
        request_method: Set(record.request_method.to_string()),
        request_url: Set(record.request_url.clone()),
        request_body: Set(record.request_body.clone()),
        request_headers: Set(request_headers),
        response_code: Set(record.response_code.map(i32::from)),
        response_body: Set(record.response_body.clone()),
        error: Set(record.error.clone()),
        duration_ms: Set(record.duration_ms.min(i64::MAX as u64) as i64),
        next_retry_at: Set(record.next_retry_at),
        created_at: Set(record.created_at),
    })
}

pub fn model_to_retry_job(model: postback_retry_job::Model) -> RetryJob {
    RetryJob {
        id: model.id,
        chain_id: model.chain_id,
        profile_id: model.profile_id,
        event_id: model.event_id,
        attempt: model.attempt.max(1) as u32,
        due_at: model.due_at,
        created_at: model.created_at,
    }
}

pub fn retry_job_to_active_model(
    job: &NewRetryJob,
    created_at: chrono::DateTime<chrono::Utc>,
) -> postback_retry_job::ActiveModel {
    postback_retry_job::ActiveModel {
        id: NotSet,
        chain_id: Set(job.chain_id.clone()),
        profile_id: Set(job.profile_id),
        event_id: Set(job.event_id.clone()),
        attempt: Set(job.attempt as i32),
        due_at: Set(job.due_at),
        created_at: Set(created_at),
    }
}
